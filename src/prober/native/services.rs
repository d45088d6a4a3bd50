//! Service names for well-known ports and the default port list.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Ports checked by the native port scanner when none are configured.
pub const TOP_PORTS: [u16; 32] = [
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1433, 1521, 2049, 3000,
    3306, 3389, 5432, 5900, 6379, 8000, 8080, 8081, 8443, 8888, 9000, 9200, 27017,
];

/// Static map of well-known ports to service names.
static PORT_SERVICES: LazyLock<HashMap<u16, &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    m.insert(20, "ftp-data");
    m.insert(21, "ftp");
    m.insert(22, "ssh");
    m.insert(23, "telnet");
    m.insert(25, "smtp");
    m.insert(53, "dns");
    m.insert(80, "http");
    m.insert(110, "pop3");
    m.insert(111, "rpcbind");
    m.insert(135, "msrpc");
    m.insert(139, "netbios-ssn");
    m.insert(143, "imap");
    m.insert(389, "ldap");
    m.insert(443, "https");
    m.insert(445, "microsoft-ds");
    m.insert(587, "submission");
    m.insert(636, "ldaps");
    m.insert(873, "rsync");
    m.insert(993, "imaps");
    m.insert(995, "pop3s");
    m.insert(1433, "mssql");
    m.insert(1521, "oracle");
    m.insert(2049, "nfs");
    m.insert(2375, "docker");
    m.insert(3000, "grafana");
    m.insert(3306, "mysql");
    m.insert(3389, "rdp");
    m.insert(5432, "postgresql");
    m.insert(5900, "vnc");
    m.insert(6379, "redis");
    m.insert(6443, "kubernetes-api");
    m.insert(8000, "http-alt");
    m.insert(8080, "http-proxy");
    m.insert(8081, "http-alt");
    m.insert(8443, "https-alt");
    m.insert(8888, "http-alt");
    m.insert(9000, "cslistener");
    m.insert(9200, "elasticsearch");
    m.insert(11211, "memcached");
    m.insert(27017, "mongodb");

    m
});

/// Look up the probable service name for a given port.
pub fn service_name(port: u16) -> Option<&'static str> {
    PORT_SERVICES.get(&port).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_ports() {
        assert_eq!(service_name(22), Some("ssh"));
        assert_eq!(service_name(443), Some("https"));
        assert_eq!(service_name(12345), None);
    }

    #[test]
    fn test_top_ports_are_named() {
        assert!(TOP_PORTS.iter().all(|p| service_name(*p).is_some()));
    }
}
