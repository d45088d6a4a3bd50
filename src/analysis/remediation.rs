//! Remediation guidance keyed by vulnerability class.
//!
//! Scanner findings carry a human title and a template or matcher name.
//! [`lookup`] maps either onto one of the known classes below and falls back
//! to generic guidance when nothing matches.

use serde::Serialize;

/// Guidance for one vulnerability class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Remediation {
    /// Class key matched against titles and template names.
    pub key: &'static str,
    pub summary: &'static str,
    pub steps: &'static [&'static str],
    pub code_example: &'static str,
    pub references: &'static [&'static str],
}

/// Known classes, in match order.
pub const REMEDIATIONS: &[Remediation] = &[
    Remediation {
        key: "sql injection",
        summary: "Protect against SQL injection attacks by using parameterized queries and input validation",
        steps: &[
            "Replace dynamic SQL queries with parameterized queries or prepared statements",
            "Implement proper input validation and sanitization for all user inputs",
            "Apply the principle of least privilege to database accounts",
            "Use an ORM (Object-Relational Mapping) library when possible",
            "Implement a Web Application Firewall (WAF) as an additional layer of protection",
        ],
        code_example: "cursor.execute(\"SELECT * FROM users WHERE username = ?\", (username,))",
        references: &[
            "OWASP SQL Injection Prevention Cheat Sheet: https://cheatsheetseries.owasp.org/cheatsheets/SQL_Injection_Prevention_Cheat_Sheet.html",
            "PortSwigger SQL Injection Guide: https://portswigger.net/web-security/sql-injection",
        ],
    },
    Remediation {
        key: "xss",
        summary: "Prevent Cross-Site Scripting (XSS) by implementing proper output encoding and CSP headers",
        steps: &[
            "Implement context-appropriate output encoding for all user-controlled data",
            "Use Content-Security-Policy (CSP) headers to restrict script execution",
            "Sanitize all user inputs before rendering them in HTML contexts",
            "Use modern frameworks that automatically escape output",
            "Implement X-XSS-Protection header as an additional defense",
        ],
        code_example: "Content-Security-Policy: default-src 'self'; script-src 'self' 'nonce-{RANDOM_NONCE}'; object-src 'none'",
        references: &[
            "OWASP XSS Prevention Cheat Sheet: https://cheatsheetseries.owasp.org/cheatsheets/Cross_Site_Scripting_Prevention_Cheat_Sheet.html",
            "Content Security Policy (CSP) Quick Reference: https://content-security-policy.com/",
        ],
    },
    Remediation {
        key: "open redirect",
        summary: "Prevent open redirect vulnerabilities by validating destination URLs against a whitelist",
        steps: &[
            "Implement a whitelist of allowed redirect destinations",
            "Validate all redirect parameters against this whitelist",
            "Use relative path redirects when possible",
            "For external redirects, use an intermediate page that requires user confirmation",
            "Consider implementing URL signing for sensitive redirects",
        ],
        code_example: "if not urlparse(next_url).netloc or urlparse(next_url).netloc in allowed_hosts: return redirect(next_url)",
        references: &[
            "OWASP Unvalidated Redirects and Forwards Cheat Sheet: https://cheatsheetseries.owasp.org/cheatsheets/Unvalidated_Redirects_and_Forwards_Cheat_Sheet.html",
        ],
    },
    Remediation {
        key: "csrf",
        summary: "Protect against Cross-Site Request Forgery (CSRF) with anti-CSRF tokens and proper validation",
        steps: &[
            "Implement anti-CSRF tokens for all state-changing operations",
            "Ensure tokens are unique per user session and per request",
            "Add the 'SameSite=Strict' attribute to cookies",
            "Use the 'X-CSRF-TOKEN' header for AJAX requests",
            "Consider implementing custom request headers for sensitive operations",
        ],
        code_example: "Set-Cookie: session=...; Secure; HttpOnly; SameSite=Strict",
        references: &[
            "OWASP CSRF Prevention Cheat Sheet: https://cheatsheetseries.owasp.org/cheatsheets/Cross-Site_Request_Forgery_Prevention_Cheat_Sheet.html",
            "SameSite Cookie Attribute: https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Set-Cookie/SameSite",
        ],
    },
    Remediation {
        key: "ssrf",
        summary: "Protect against Server-Side Request Forgery (SSRF) by validating and restricting URLs",
        steps: &[
            "Implement a whitelist of allowed destinations",
            "Validate and sanitize all user-provided URLs",
            "Use a URL parsing library to canonicalize URLs before validation",
            "Block requests to internal networks (127.0.0.0/8, 169.254.0.0/16, etc.)",
            "Use network-level protections like firewalls to restrict server connections",
        ],
        code_example: "if ip.is_private or ip.is_loopback or ip.is_link_local: raise ValueError(\"URL points to internal network\")",
        references: &[
            "OWASP SSRF Prevention Cheat Sheet: https://cheatsheetseries.owasp.org/cheatsheets/Server_Side_Request_Forgery_Prevention_Cheat_Sheet.html",
            "PortSwigger SSRF Guide: https://portswigger.net/web-security/ssrf",
        ],
    },
    Remediation {
        key: "lfi",
        summary: "Protect against Local File Inclusion (LFI) by restricting file access and validating paths",
        steps: &[
            "Implement strict input validation for file paths",
            "Use a whitelist of allowed files or directories",
            "Avoid using user input directly in file operations",
            "Implement proper file access controls",
            "Consider using a file abstraction layer instead of direct file system access",
        ],
        code_example: "$path = realpath($baseDir . $file); if (strpos($path, $baseDir) === 0) { include $path; }",
        references: &[
            "OWASP File Inclusion Guide: https://owasp.org/www-project-web-security-testing-guide/latest/4-Web_Application_Security_Testing/07-Input_Validation_Testing/11.1-Testing_for_Local_File_Inclusion",
        ],
    },
    Remediation {
        key: "rfi",
        summary: "Protect against Remote File Inclusion (RFI) by disabling remote includes and validating sources",
        steps: &[
            "Disable remote file includes if not needed (allow_url_include=Off in PHP)",
            "Implement a whitelist of allowed external resources",
            "Validate all URLs against the whitelist",
            "Use content verification for included files",
            "Consider alternatives to dynamic file inclusion",
        ],
        code_example: "allow_url_include = Off\nallow_url_fopen = Off",
        references: &[
            "OWASP Remote File Inclusion Guide: https://owasp.org/www-project-web-security-testing-guide/latest/4-Web_Application_Security_Testing/07-Input_Validation_Testing/11.2-Testing_for_Remote_File_Inclusion",
        ],
    },
    Remediation {
        key: "cve",
        summary: "Address known Common Vulnerabilities and Exposures (CVEs) by applying patches and updates",
        steps: &[
            "Identify the specific CVE affecting your software",
            "Update the affected software to the latest patched version",
            "If patches are not available, implement temporary mitigations as recommended by the vendor",
            "Set up a vulnerability management process to track and prioritize patching",
            "Consider using a Web Application Firewall (WAF) to block exploitation attempts",
        ],
        code_example: "apt-get update && apt-get install --only-upgrade <package>",
        references: &[
            "National Vulnerability Database: https://nvd.nist.gov/",
            "OWASP Dependency Check: https://owasp.org/www-project-dependency-check/",
        ],
    },
    Remediation {
        key: "outdated",
        summary: "Fix outdated software vulnerabilities by updating components and implementing security patches",
        steps: &[
            "Inventory all software components and dependencies",
            "Update to the latest stable and secure versions",
            "Set up automated dependency checking",
            "Implement a regular update schedule and policy",
            "Consider containerization to isolate components and simplify updates",
        ],
        code_example: "npm audit fix\npip list --outdated",
        references: &[
            "OWASP Top 10 - A9:2017 Using Components with Known Vulnerabilities: https://owasp.org/www-project-top-ten/2017/A9_2017-Using_Components_with_Known_Vulnerabilities",
            "Snyk - Dependency Vulnerability Scanner: https://snyk.io/",
        ],
    },
    Remediation {
        key: "missing header",
        summary: "Implement security headers to improve web application defense against common attacks",
        steps: &[
            "Implement Content-Security-Policy (CSP) header",
            "Add X-XSS-Protection header",
            "Set X-Content-Type-Options: nosniff header",
            "Configure Strict-Transport-Security (HSTS) header",
            "Add X-Frame-Options header to prevent clickjacking",
        ],
        code_example: "add_header X-Content-Type-Options \"nosniff\" always;\nadd_header X-Frame-Options \"SAMEORIGIN\" always;",
        references: &[
            "OWASP Secure Headers Project: https://owasp.org/www-project-secure-headers/",
            "Mozilla Observatory: https://observatory.mozilla.org/",
        ],
    },
    Remediation {
        key: "information disclosure",
        summary: "Prevent sensitive information disclosure by controlling error messages and removing debugging info",
        steps: &[
            "Configure custom error pages to avoid revealing system information",
            "Remove version information from HTTP headers",
            "Disable directory listings on web servers",
            "Implement proper exception handling to avoid stack traces in responses",
            "Remove comments containing sensitive information from client-side code",
        ],
        code_example: "server_tokens off;\nexpose_php = Off",
        references: &[
            "OWASP Information Leakage Guide: https://owasp.org/www-project-web-security-testing-guide/latest/4-Web_Application_Security_Testing/01-Information_Gathering/07-Map_Application_Architecture",
        ],
    },
    Remediation {
        key: "directory listing",
        summary: "Disable directory listing to prevent unauthorized browsing of server directories",
        steps: &[
            "Disable directory listing in web server configuration",
            "Create index files in all directories that need to be accessed",
            "Configure a custom 403 Forbidden page",
            "Use access controls to restrict directory access",
            "Regularly audit accessible directories",
        ],
        code_example: "Options -Indexes\nautoindex off;",
        references: &[
            "OWASP Testing for Directory Traversal: https://owasp.org/www-project-web-security-testing-guide/latest/4-Web_Application_Security_Testing/05-Authorization_Testing/01-Testing_Directory_Traversal_File_Include",
        ],
    },
    Remediation {
        key: "default credentials",
        summary: "Eliminate default credential vulnerabilities by changing passwords and implementing proper authentication",
        steps: &[
            "Change all default credentials on all systems and components",
            "Implement a strong password policy for all accounts",
            "Set up multi-factor authentication (MFA) where possible",
            "Audit system accounts regularly",
            "Implement password rotation for service accounts",
        ],
        code_example: "passwd admin",
        references: &[
            "OWASP Authentication Best Practices: https://cheatsheetseries.owasp.org/cheatsheets/Authentication_Cheat_Sheet.html",
            "NIST Password Guidelines: https://pages.nist.gov/800-63-3/sp800-63b.html",
        ],
    },
    Remediation {
        key: "sensitive file",
        summary: "Protect sensitive files by removing them from publicly accessible locations and implementing access controls",
        steps: &[
            "Remove sensitive files from web-accessible directories",
            "Move configuration files outside the web root",
            "Use environment variables for sensitive configuration",
            "Implement proper file permissions",
            "Use .gitignore to prevent committing sensitive files",
        ],
        code_example: "location ~ /\\.(git|env) { deny all; }",
        references: &[
            "OWASP Sensitive Data Exposure: https://owasp.org/www-project-top-ten/2017/A3_2017-Sensitive_Data_Exposure",
            "The Twelve-Factor App - Config: https://12factor.net/config",
        ],
    },
    Remediation {
        key: "ssl tls",
        summary: "Fix SSL/TLS vulnerabilities by configuring proper protocols, cipher suites, and certificates",
        steps: &[
            "Disable outdated protocols (SSL 2.0, SSL 3.0, TLS 1.0, TLS 1.1)",
            "Enable only strong cipher suites",
            "Configure proper certificate validation",
            "Implement HTTP Strict Transport Security (HSTS)",
            "Use secure flag for cookies",
        ],
        code_example: "ssl_protocols TLSv1.2 TLSv1.3;\nadd_header Strict-Transport-Security \"max-age=63072000\" always;",
        references: &[
            "Mozilla SSL Configuration Generator: https://ssl-config.mozilla.org/",
            "OWASP Transport Layer Protection Cheat Sheet: https://cheatsheetseries.owasp.org/cheatsheets/Transport_Layer_Protection_Cheat_Sheet.html",
        ],
    },
    Remediation {
        key: "cors",
        summary: "Configure proper Cross-Origin Resource Sharing (CORS) policies to prevent unauthorized access",
        steps: &[
            "Specify the exact origins that should be allowed access",
            "Limit the HTTP methods allowed for cross-origin requests",
            "Restrict which HTTP headers can be used",
            "Control whether credentials can be included in cross-origin requests",
            "Set appropriate caching directives for preflight responses",
        ],
        code_example: "add_header 'Access-Control-Allow-Origin' 'https://example.com';\nadd_header 'Access-Control-Allow-Methods' 'GET, POST, OPTIONS';",
        references: &[
            "OWASP CORS Guide: https://cheatsheetseries.owasp.org/cheatsheets/Cross-Origin_Resource_Sharing_Cheat_Sheet.html",
            "MDN CORS: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS",
        ],
    },
];

/// Guidance used when no class matches.
pub const GENERIC: Remediation = Remediation {
    key: "generic",
    summary: "Review and fix this vulnerability based on security best practices",
    steps: &[
        "Identify the root cause of the vulnerability",
        "Research OWASP guidelines for this type of issue",
        "Apply security patches or updates if available",
        "Implement appropriate input validation and output encoding",
        "Consider adding additional security controls",
    ],
    code_example: "",
    references: &[
        "OWASP Top 10: https://owasp.org/www-project-top-ten/",
        "SANS CWE Top 25: https://www.sans.org/top25-software-errors/",
    ],
};

/// Find guidance for a finding title and template name.
///
/// A full class key contained in either string wins. Otherwise the first
/// word of a key matching a whole word of either string is accepted, so
/// "Directory indexing enabled" still lands on directory listing.
pub fn lookup(title: &str, template: &str) -> &'static Remediation {
    let title = title.to_ascii_lowercase();
    let template = template.to_ascii_lowercase();

    if let Some(found) = REMEDIATIONS
        .iter()
        .find(|r| title.contains(r.key) || template.contains(r.key))
    {
        return found;
    }

    REMEDIATIONS
        .iter()
        .find(|r| {
            let first = r.key.split(' ').next().unwrap_or(r.key);
            has_word(&title, first) || has_word(&template, first)
        })
        .unwrap_or(&GENERIC)
}

fn has_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|w| w == word)
}
