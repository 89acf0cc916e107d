use std::path::Path;

/// Get the *base* extension to help infer filetype, which ignores compression-related
/// extensions (`.gz` and `.bgz`).
pub fn get_base_extension<P: AsRef<Path>>(filepath: P) -> Option<String> {
    let name = filepath.as_ref().file_name()?.to_str()?;
    let mut parts = name.rsplit('.');
    let last = parts.next()?;
    let before = parts.next()?;
    // foo.csv.gz is a csv, but a bare data.gz stays gz
    if ["gz", "bgz"].contains(&last) && parts.next().is_some() {
        Some(before.to_string())
    } else {
        Some(last.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::get_base_extension;

    #[test]
    fn test_base_extension() {
        assert_eq!(get_base_extension("in/gnomad.csv"), Some("csv".to_string()));
        assert_eq!(get_base_extension("in/gnomad.csv.gz"), Some("csv".to_string()));
        assert_eq!(get_base_extension("clinvar.xml.bgz"), Some("xml".to_string()));
        assert_eq!(get_base_extension("custom.XLSX"), Some("XLSX".to_string()));
        assert_eq!(get_base_extension("data.gz"), Some("gz".to_string()));
        assert_eq!(get_base_extension("README"), None);
    }
}
