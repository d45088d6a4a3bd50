//! Built-in external tool adapters.
//!
//! Each entry describes how one well-known recon tool is invoked and how
//! its output is parsed. Users can add more through `tools` in the
//! settings file.

use crate::prober::command::{EndpointForm, LineFormat, TargetInput, ToolSpec};
use crate::types::StageKind;
use std::collections::BTreeMap;

fn spec(
    id: &str,
    stage: StageKind,
    priority: u8,
    args: &[&str],
    input: TargetInput,
    endpoints: EndpointForm,
    format: LineFormat,
) -> ToolSpec {
    ToolSpec {
        id: id.to_string(),
        stage,
        priority,
        binary: id.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        input,
        endpoints,
        format,
    }
}

fn json(subject: &[&str], separator: &str, attributes: &[(&str, &str)]) -> LineFormat {
    LineFormat::Json {
        subject: subject.iter().map(|s| s.to_string()).collect(),
        separator: separator.to_string(),
        attributes: attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn tokens(subject: isize, attributes: &[(&str, isize)], prefix_target: bool) -> LineFormat {
    LineFormat::Tokens {
        subject,
        attributes: attributes
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<_, _>>(),
        prefix_target,
    }
}

/// The default external tool adapters, grouped by stage.
pub fn builtin_tools() -> Vec<ToolSpec> {
    use EndpointForm::{Hosts, Raw, Urls};
    use StageKind::*;
    use TargetInput::{Argument, Stdin};

    vec![
        // Subdomain enumeration: all available tools run, results are unioned.
        spec("subfinder", Subdomain, 90, &["-silent", "-d", "{target}"], Argument, Hosts, LineFormat::default()),
        spec("assetfinder", Subdomain, 80, &["--subs-only", "{target}"], Argument, Hosts, LineFormat::default()),
        spec("amass", Subdomain, 70, &["enum", "-passive", "-nocolor", "-d", "{target}"], Argument, Hosts, LineFormat::default()),
        // Live hosts.
        spec(
            "httpx",
            LiveHost,
            90,
            &["-silent", "-json", "-threads", "{threads}"],
            Stdin,
            Raw,
            json(
                &["/url"],
                ":",
                &[("status", "/status_code"), ("title", "/title"), ("server", "/webserver")],
            ),
        ),
        // Ports.
        spec(
            "naabu",
            PortScan,
            90,
            &["-silent", "-json", "-c", "{threads}"],
            Stdin,
            Hosts,
            json(&["/host", "/port"], ":", &[("ip", "/ip")]),
        ),
        spec(
            "nmap",
            PortScan,
            80,
            &["-Pn", "--open", "-T4", "-oG", "-", "-iL", "-"],
            Stdin,
            Hosts,
            LineFormat::NmapGrepable,
        ),
        // Directories: first available only.
        spec(
            "ffuf",
            DirectoryEnum,
            90,
            &["-u", "{target}/FUZZ", "-w", "{dir_wordlist}", "-t", "{threads}", "-json", "-s"],
            Argument,
            Urls,
            json(&["/url"], ":", &[("status", "/status"), ("length", "/length")]),
        ),
        spec(
            "gobuster",
            DirectoryEnum,
            80,
            &["dir", "-u", "{target}", "-w", "{dir_wordlist}", "-t", "{threads}", "-q", "--no-color"],
            Argument,
            Urls,
            tokens(0, &[("status", 2)], true),
        ),
        spec(
            "dirsearch",
            DirectoryEnum,
            70,
            &["-u", "{target}", "-w", "{dir_wordlist}", "-t", "{threads}", "-q", "--no-color"],
            Argument,
            Urls,
            tokens(-1, &[("status", 1)], true),
        ),
        // Vulnerabilities.
        spec(
            "nuclei",
            VulnScan,
            90,
            &["-silent", "-jsonl", "-c", "{threads}"],
            Stdin,
            Urls,
            json(
                &["/template-id", "/matched-at"],
                "@",
                &[
                    ("name", "/info/name"),
                    ("severity", "/info/severity"),
                    ("description", "/info/description"),
                    ("url", "/matched-at"),
                    ("matcher", "/matcher-name"),
                ],
            ),
        ),
        // Screenshots.
        spec(
            "gowitness",
            Screenshot,
            90,
            &["scan", "single", "--url", "{target}"],
            Argument,
            Urls,
            LineFormat::Silent,
        ),
    ]
}
