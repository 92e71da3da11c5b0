//! Upload filename handling and storage path conventions

use chrono::{DateTime, Utc};

/// Extensions accepted for plan uploads
pub const ALLOWED_EXTENSIONS: [&str; 2] = ["docx", "pdf"];

/// MIME type of Word documents
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// True when the filename carries an allowed extension (case-insensitive)
pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed)),
        None => false,
    }
}

/// Reduce an uploaded filename to a safe ASCII name
///
/// Path separators become spaces, anything outside `[A-Za-z0-9_.-]` is
/// dropped, whitespace runs collapse to `_` and leading/trailing dots and
/// underscores are stripped. May return an empty string.
pub fn secure_filename(filename: &str) -> String {
    let replaced: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = replaced.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Bucket path for a teacher upload: `{user_id}/{unix_ts}_{name}`
pub fn upload_path(user_id: &str, filename: &str, at: DateTime<Utc>) -> String {
    let stamp = at.timestamp_micros() as f64 / 1_000_000.0;
    format!("{}/{}_{}", user_id, stamp, secure_filename(filename))
}

/// Bucket path for a generated plan document
///
/// The subject goes through [`secure_filename`], so model-supplied titles
/// cannot add folders or URL delimiters to the key.
pub fn generated_path(user_id: &str, subject: &str, plan_id: i64) -> String {
    let name = match secure_filename(subject) {
        name if name.is_empty() => "CLP".to_string(),
        name => name,
    };
    format!("{}/{}_Generated_{}.docx", user_id, name, plan_id)
}

/// Name offered to the browser when downloading a stored plan file
///
/// Strips the folder and everything up to the first `_` (the upload
/// timestamp).
pub fn download_name(storage_path: &str) -> String {
    let base = storage_path.rsplit('/').next().unwrap_or(storage_path);
    match base.split_once('_') {
        Some((_, rest)) if !rest.is_empty() => rest.to_string(),
        _ => base.to_string(),
    }
}

/// Best-effort MIME type from the extension
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "docx" => DOCX_CONTENT_TYPE,
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file("plan.docx"));
        assert!(allowed_file("PLAN.PDF"));
        assert!(!allowed_file("plan.doc"));
        assert!(!allowed_file("docx"));
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My cool plan.docx"), "My_cool_plan.docx");
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("résumé.pdf"), "rsum.pdf");
        assert_eq!(secure_filename("..."), "");
    }

    #[test]
    fn test_upload_path_and_download_name() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let path = upload_path("user-1", "HCI Plan.docx", at);
        assert_eq!(path, "user-1/1704164645_HCI_Plan.docx");
        assert_eq!(download_name(&path), "HCI_Plan.docx");
    }

    #[test]
    fn test_generated_path() {
        assert_eq!(
            generated_path("u1", "Intro to HCI", 42),
            "u1/Intro_to_HCI_Generated_42.docx"
        );
        assert_eq!(
            generated_path("u1", "C# Programming?", 3),
            "u1/C_Programming_Generated_3.docx"
        );
        assert_eq!(
            generated_path("u1", "../../other/Secrets", 4),
            "u1/other_Secrets_Generated_4.docx"
        );
        assert_eq!(generated_path("u1", "###", 5), "u1/CLP_Generated_5.docx");
    }

    #[test]
    fn test_download_name_without_underscore() {
        assert_eq!(download_name("u1/plain.pdf"), "plain.pdf");
    }
}
