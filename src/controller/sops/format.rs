//! # SOPS File Format
//!
//! Maps `stringData` keys to the sops `--input-type` / `--output-type` value.

use std::fmt;

/// Format passed to sops for both input and output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
    Ini,
    Dotenv,
    Binary,
}

impl FileFormat {
    /// Infer the format from a file name
    ///
    /// The extension is the suffix starting at the final `.` of the last path
    /// element and is matched case-sensitively, so `.env` on its own is a
    /// dotenv file and `secret.YAML` is binary.
    #[must_use]
    pub fn from_file_name(file_name: &str) -> Self {
        match extension(file_name) {
            ".yaml" | ".yml" => FileFormat::Yaml,
            ".json" => FileFormat::Json,
            ".ini" => FileFormat::Ini,
            ".env" => FileFormat::Dotenv,
            _ => FileFormat::Binary,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Yaml => "yaml",
            FileFormat::Json => "json",
            FileFormat::Ini => "ini",
            FileFormat::Dotenv => "dotenv",
            FileFormat::Binary => "binary",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn extension(file_name: &str) -> &str {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    base.rfind('.').map_or("", |idx| &base[idx..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mapping() {
        let cases = [
            ("config.yaml", FileFormat::Yaml),
            ("config.yml", FileFormat::Yaml),
            ("settings.json", FileFormat::Json),
            ("app.ini", FileFormat::Ini),
            ("app.env", FileFormat::Dotenv),
            (".env", FileFormat::Dotenv),
            ("id_rsa", FileFormat::Binary),
            ("cert.pem", FileFormat::Binary),
            ("", FileFormat::Binary),
        ];
        for (file_name, expected) in cases {
            assert_eq!(
                FileFormat::from_file_name(file_name),
                expected,
                "file name {file_name:?}"
            );
        }
    }

    #[test]
    fn test_extension_is_case_sensitive() {
        assert_eq!(FileFormat::from_file_name("secret.YAML"), FileFormat::Binary);
        assert_eq!(FileFormat::from_file_name("secret.Json"), FileFormat::Binary);
    }

    #[test]
    fn test_extension_uses_final_dot_of_last_element() {
        assert_eq!(FileFormat::from_file_name("a.json.yaml"), FileFormat::Yaml);
        assert_eq!(FileFormat::from_file_name("dir.yaml/key"), FileFormat::Binary);
        assert_eq!(FileFormat::from_file_name("dir/key.env"), FileFormat::Dotenv);
    }

    #[test]
    fn test_display() {
        assert_eq!(FileFormat::Dotenv.to_string(), "dotenv");
        assert_eq!(FileFormat::Binary.to_string(), "binary");
    }
}
