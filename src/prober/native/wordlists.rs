//! Wordlists for the native brute-force probers.

use crate::error::ProbeFailure;
use std::path::Path;
use std::sync::Arc;

/// Shared list of words.
pub type Wordlist = Arc<Vec<String>>;

/// Subdomain labels tried when no DNS wordlist is configured.
pub const DEFAULT_SUBDOMAINS: &[&str] = &[
    "www", "mail", "remote", "blog", "webmail", "server", "ns1", "ns2", "smtp", "secure", "vpn",
    "m", "shop", "ftp", "mail2", "test", "portal", "ns", "ww1", "host", "support", "dev", "web",
    "bbs", "mx", "email", "cloud", "1", "mail1", "2", "forum", "owa", "www2", "gw", "admin",
    "store", "mx1", "cdn", "api", "exchange", "app", "gov", "vps", "news",
    "staging", "beta", "intranet", "internal", "auth", "login", "git", "jenkins", "jira",
    "confluence", "db", "sso", "status", "docs",
];

/// Paths tried when no directory wordlist is configured.
pub const DEFAULT_DIRECTORIES: &[&str] = &[
    ".git/config", ".env", ".htaccess", "admin", "administrator", "wp-admin", "wp-login.php",
    "login", "dashboard", "api", "backup", "backups", "config", "db", "debug", "dev", "test",
    "staging", "beta", "old", "phpinfo.php", "phpmyadmin", "server-status", "robots.txt",
    "sitemap.xml", "uploads", "static", "assets", "console", "jenkins", ".well-known/security.txt",
];

/// Load a wordlist from `path`, or fall back to `defaults`.
///
/// Blank lines and `#` comments are skipped.
pub async fn load_wordlist(path: Option<&Path>, defaults: &[&str]) -> Result<Wordlist, ProbeFailure> {
    let Some(path) = path else {
        return Ok(Arc::new(defaults.iter().map(|w| w.to_string()).collect()));
    };

    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        ProbeFailure::invalid_input(format!("cannot read wordlist {}: {}", path.display(), e))
    })?;
    let words: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect();

    if words.is_empty() {
        return Err(ProbeFailure::invalid_input(format!(
            "wordlist {} is empty",
            path.display()
        )));
    }
    Ok(Arc::new(words))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_defaults_without_path() {
        let words = load_wordlist(None, DEFAULT_SUBDOMAINS).await.unwrap();
        assert_eq!(words.len(), DEFAULT_SUBDOMAINS.len());
    }

    #[tokio::test]
    async fn test_file_skips_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# header\nadmin\n\n  api  ").unwrap();
        let words = load_wordlist(Some(file.path()), &[]).await.unwrap();
        assert_eq!(*words, vec!["admin".to_string(), "api".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_file_is_invalid_input() {
        let err = load_wordlist(Some(Path::new("/nonexistent/words.txt")), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ProbeFailureKind::InvalidInput);
    }
}
