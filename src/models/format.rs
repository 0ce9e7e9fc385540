use serde::{Deserialize, Serialize};

/// Logical archive format selected by the caller.
///
/// Zip and SevenZ optionally carry a password; every other format silently
/// ignores one, so batch callers never need per-format branching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "password")]
pub enum ArchiveFormat {
    Zip(Option<String>),
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    SevenZ(Option<String>),
    Bzip2,
    Xz,
    Gzip,
}

/// Stream compression codec applied around a container (or to a bare stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Gzip,
    Bzip2,
    Xz,
}

/// Physical layout resolved from an [`ArchiveFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Zip,
    SevenZ,
    Tar(Codec),
    /// Raw single-stream compression, no entry container at all.
    Stream(Codec),
}

impl ArchiveFormat {
    /// Resolve the container kind and filter chain for this format.
    ///
    /// Pure catalog lookup; there is no failure path. An out-of-range format
    /// cannot be constructed, so "unsupported format" is only ever raised for
    /// inputs read from disk, never for this enum.
    pub fn container(&self) -> ContainerKind {
        match self {
            ArchiveFormat::Zip(_) => ContainerKind::Zip,
            ArchiveFormat::Tar => ContainerKind::Tar(Codec::None),
            ArchiveFormat::TarGz => ContainerKind::Tar(Codec::Gzip),
            ArchiveFormat::TarBz2 => ContainerKind::Tar(Codec::Bzip2),
            ArchiveFormat::TarXz => ContainerKind::Tar(Codec::Xz),
            ArchiveFormat::SevenZ(_) => ContainerKind::SevenZ,
            ArchiveFormat::Bzip2 => ContainerKind::Stream(Codec::Bzip2),
            ArchiveFormat::Xz => ContainerKind::Stream(Codec::Xz),
            ArchiveFormat::Gzip => ContainerKind::Stream(Codec::Gzip),
        }
    }

    /// Whether this format can encrypt entries.
    pub fn supports_password(&self) -> bool {
        matches!(self, ArchiveFormat::Zip(_) | ArchiveFormat::SevenZ(_))
    }

    /// Password to apply, if the format carries one.
    pub fn password(&self) -> Option<&str> {
        match self {
            ArchiveFormat::Zip(pass) | ArchiveFormat::SevenZ(pass) => pass.as_deref(),
            _ => None,
        }
    }

    /// Conventional file extension for archives of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip(_) => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::SevenZ(_) => "7z",
            ArchiveFormat::Bzip2 => "bz2",
            ArchiveFormat::Xz => "xz",
            ArchiveFormat::Gzip => "gz",
        }
    }
}
