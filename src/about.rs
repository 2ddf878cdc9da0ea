pub const HCR_PROBER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const HCR_PROBER_BUILD_N: &str = env!("HCR_PROBER_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "hcr-prober {}\nBuild {}\nHCR v3 split-initiator probe design",
        HCR_PROBER_VERSION, HCR_PROBER_BUILD_N
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_text() {
        let text = version_cli_text();
        assert!(text.starts_with(&format!("hcr-prober {HCR_PROBER_VERSION}")));
        assert!(text.contains("Build "));
    }
}
