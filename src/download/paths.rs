use std::path::{Component, Path, PathBuf};

use crate::index::UNFILED_ALBUM_DIR;

/// Build the local path for an item: `{base}/{album title}/{filename}`.
///
/// Both the album title and the filename are cleaned of characters that are
/// invalid on common filesystems, so a title like `"2023/24 Ski"` stays one
/// directory level. An item without a usable filename is named from its id.
pub fn destination_path(
    base: &Path,
    album_title: &str,
    filename: &str,
    id: &str,
    mime_type: &str,
) -> PathBuf {
    let dir = path_component(album_title).unwrap_or_else(|| UNFILED_ALBUM_DIR.to_string());
    let name = path_component(filename).unwrap_or_else(|| fingerprint_filename(id, mime_type));

    let tail = Path::new(&dir).join(&name);
    debug_assert!(tail
        .components()
        .all(|c| matches!(c, Component::Normal(_))));
    base.join(tail)
}

/// Clean `raw` into a single path component. Returns `None` when nothing
/// usable is left: empty, whitespace, or only dots (`.`, `..`, `...`), any of
/// which would resolve to the base directory or one of its parents.
fn path_component(raw: &str) -> Option<String> {
    let cleaned = clean_filename(raw);
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        return None;
    }
    Some(cleaned)
}

/// Clean a filename by removing characters that are invalid on common
/// filesystems: `/`, `\`, `:`, `*`, `?`, `"`, `<`, `>`, `|`.
pub fn clean_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// Add a string suffix before the file extension.
///
/// For example, `"photo.jpg"` with suffix `"abc"` becomes `"photo-abc.jpg"`.
pub fn insert_suffix(path: &str, suffix: &str) -> String {
    match path.rfind('.') {
        Some(dot_pos) if dot_pos > 0 => {
            let (stem, ext) = path.split_at(dot_pos);
            let mut result = String::with_capacity(stem.len() + 1 + suffix.len() + ext.len());
            result.push_str(stem);
            result.push('-');
            result.push_str(suffix);
            result.push_str(ext);
            result
        }
        _ => {
            let mut result = String::with_capacity(path.len() + 1 + suffix.len());
            result.push_str(path);
            result.push('-');
            result.push_str(suffix);
            result
        }
    }
}

/// First 7 filesystem-safe characters of a content id.
fn id7(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(7)
        .collect()
}

/// Sibling of `path` whose filename carries the first 7 characters of `id`,
/// used when two items would otherwise land on the same path.
pub fn disambiguated_path(path: &Path, id: &str) -> PathBuf {
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(insert_suffix(&filename, &id7(id)))
}

/// File extension for the MIME types the Library API reports.
pub fn mime_type_extension(mime_type: &str) -> &'static str {
    match mime_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/heif" => "heif",
        "image/tiff" => "tif",
        "image/bmp" => "bmp",
        "image/x-adobe-dng" | "image/dng" => "dng",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/3gpp" => "3gp",
        "video/x-msvideo" => "avi",
        "video/mpeg" => "mpg",
        "video/webm" => "webm",
        _ => "bin",
    }
}

/// Fallback filename for an item that reports none: the id with
/// non-alphanumeric characters replaced, truncated to 12 chars, plus the
/// extension implied by the MIME type.
pub fn fingerprint_filename(id: &str, mime_type: &str) -> String {
    let fingerprint: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(12)
        .collect();
    format!("{}.{}", fingerprint, mime_type_extension(mime_type))
}

/// Whether the path looks like a JPEG by extension.
pub fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_path_uses_album_title() {
        assert_eq!(
            destination_path(Path::new("/out"), "Trip", "img.jpg", "P1", "image/jpeg"),
            PathBuf::from("/out/Trip/img.jpg")
        );
    }

    #[test]
    fn test_destination_path_unfiled() {
        assert_eq!(
            destination_path(
                Path::new("/out"),
                UNFILED_ALBUM_DIR,
                "img.jpg",
                "P1",
                "image/jpeg"
            ),
            PathBuf::from("/out/No Album/img.jpg")
        );
        assert_eq!(
            destination_path(Path::new("/out"), "  ", "img.jpg", "P1", "image/jpeg"),
            PathBuf::from("/out/No Album/img.jpg")
        );
    }

    #[test]
    fn test_destination_path_cleans_title_and_filename() {
        assert_eq!(
            destination_path(Path::new("/out"), "2023/24 Ski", "a:b.jpg", "P1", "image/jpeg"),
            PathBuf::from("/out/202324 Ski/ab.jpg")
        );
    }

    #[test]
    fn test_destination_path_without_filename() {
        assert_eq!(
            destination_path(Path::new("/out"), "Trip", "", "AF1Qip/xyz+long-id", "video/mp4"),
            PathBuf::from("/out/Trip/AF1Qip_xyz_l.mp4")
        );
    }

    #[test]
    fn test_dot_only_album_titles_stay_under_base() {
        for title in [".", "..", "...", " .. "] {
            let dest = destination_path(Path::new("/out"), title, "img.jpg", "P1", "image/jpeg");
            assert_eq!(dest, PathBuf::from("/out/No Album/img.jpg"), "title {title:?}");
            assert!(!dest.components().any(|c| c == Component::ParentDir));
        }
    }

    #[test]
    fn test_dot_only_filenames_use_fingerprint() {
        for name in [".", "..", "/..", "../"] {
            assert_eq!(
                destination_path(Path::new("/out"), "Trip", name, "P1", "image/png"),
                PathBuf::from("/out/Trip/P1.png"),
                "filename {name:?}"
            );
        }
    }

    #[test]
    fn test_dotted_names_are_kept() {
        assert_eq!(
            destination_path(Path::new("/out"), "..Trip", ".hidden.jpg", "P1", "image/jpeg"),
            PathBuf::from("/out/..Trip/.hidden.jpg")
        );
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("photo:1.jpg"), "photo1.jpg");
        assert_eq!(clean_filename("a/b\\c*d?e\"f<g>h|i"), "abcdefghi");
        assert_eq!(clean_filename("normal.jpg"), "normal.jpg");
    }

    #[test]
    fn test_insert_suffix() {
        assert_eq!(insert_suffix("IMG_0001.MOV", "AF1Qipa"), "IMG_0001-AF1Qipa.MOV");
        assert_eq!(insert_suffix("photo", "123"), "photo-123");
        assert_eq!(insert_suffix("a.b.mov", "id"), "a.b-id.mov");
        assert_eq!(insert_suffix(".hidden", "id"), ".hidden-id");
    }

    #[test]
    fn test_disambiguated_path() {
        assert_eq!(
            disambiguated_path(Path::new("/out/Trip/img.jpg"), "AF1QipXYZ123"),
            PathBuf::from("/out/Trip/img-AF1QipX.jpg")
        );
        assert_eq!(
            disambiguated_path(Path::new("/out/Trip/img.jpg"), "a/b+c"),
            PathBuf::from("/out/Trip/img-abc.jpg")
        );
    }

    #[test]
    fn test_mime_type_extension() {
        assert_eq!(mime_type_extension("image/jpeg"), "jpg");
        assert_eq!(mime_type_extension("IMAGE/PNG"), "png");
        assert_eq!(mime_type_extension("video/quicktime"), "mov");
        assert_eq!(mime_type_extension("application/x-unknown"), "bin");
    }

    #[test]
    fn test_is_jpeg() {
        assert!(is_jpeg(Path::new("/out/a.JPG")));
        assert!(is_jpeg(Path::new("a.jpeg")));
        assert!(!is_jpeg(Path::new("a.png")));
        assert!(!is_jpeg(Path::new("jpg")));
    }
}
