// Content-Type inference from file extensions
//
// Used when a manifest file declares no mimetype. The table covers the
// formats that actually occur in article packages (figures, supplementary
// data, media); anything unknown falls back to application/octet-stream.

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Infer the best Content-Type header value from a filename's extension.
pub fn infer_content_type(filename: &str) -> &'static str {
    let extension = match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_CONTENT_TYPE,
    };

    match extension.as_str() {
        "bmp" => "image/bmp",
        "bz2" | "bzip" => "application/x-bzip",
        "csv" => "text/comma-separated-values",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "eps" => "application/eps",
        "gif" => "image/gif",
        "gz" | "gzip" => "application/x-gzip",
        "jpg" | "jpeg" => "image/jpeg",
        "latex" => "application/x-latex",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "mp2" => "audio/mpeg",
        "mp3" => "audio/x-mpeg3",
        "mp4" | "mpg4" => "video/mp4",
        "mpg" | "mpeg" => "video/mpeg",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "rar" => "application/x-rar-compressed",
        "rtf" => "text/rtf",
        "swf" => "application/x-shockwave-flash",
        "tar" => "application/x-tar",
        "tif" | "tiff" => "image/tiff",
        "txt" => "text/plain",
        "wav" => "audio/x-wav",
        "wma" => "audio/x-ms-wma",
        "wmv" => "video/x-ms-wmv",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xml" => "text/xml",
        "zip" => "application/zip",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_extensions() {
        assert_eq!(infer_content_type("fig1.tif"), "image/tiff");
        assert_eq!(infer_content_type("fig1_small.png"), "image/png");
        assert_eq!(infer_content_type("print.pdf"), "application/pdf");
        assert_eq!(infer_content_type("manuscript.xml"), "text/xml");
        assert_eq!(infer_content_type("dataset.csv"), "text/comma-separated-values");
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(infer_content_type("FIG1.TIF"), "image/tiff");
        assert_eq!(infer_content_type("Data.XLSX"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet");
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        assert_eq!(infer_content_type("model.icb"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_no_extension_falls_back() {
        assert_eq!(infer_content_type("README"), DEFAULT_CONTENT_TYPE);
    }
}
