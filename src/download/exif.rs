use std::path::Path;

use anyhow::{Context, Result};

/// Write the item description as the EXIF `ImageDescription` tag of a JPEG.
pub fn set_description(path: &Path, description: &str) -> Result<()> {
    use little_exif::exif_tag::ExifTag;
    use little_exif::metadata::Metadata;

    let mut metadata = Metadata::new_from_path(path)
        .with_context(|| format!("Reading EXIF metadata from {}", path.display()))?;
    metadata.set_tag(ExifTag::ImageDescription(description.to_string()));
    metadata
        .write_to_file(path)
        .with_context(|| format!("Writing EXIF metadata to {}", path.display()))?;

    tracing::debug!("Set EXIF ImageDescription on {}", path.display());
    Ok(())
}
