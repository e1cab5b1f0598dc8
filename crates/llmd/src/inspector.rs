//! Process inspection - which PID is listening on a TCP port.
//!
//! Rules:
//! - Listening sockets come from /proc/net/tcp and /proc/net/tcp6 (state 0A)
//! - Socket owners are found by matching /proc/<pid>/fd links to socket inodes
//! - Inspection faults are reported as `PortLookup::Failed`, never as errors;
//!   callers asking for a plain PID see them as "no process"

use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use sysinfo::System;
use tracing::{debug, warn};

/// TCP state code for LISTEN in /proc/net/tcp
const TCP_LISTEN: u8 = 0x0A;

const TCP_TABLES: [&str; 2] = ["/proc/net/tcp", "/proc/net/tcp6"];

/// Outcome of looking up the owner of a listening port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortLookup {
    /// A process holds a LISTEN socket on the port
    Listening(u32),
    /// Nothing listens on the port
    Absent,
    /// The answer could not be determined
    Failed(String),
}

/// Finds the process, if any, listening on a TCP port
#[async_trait]
pub trait ProcessInspector: Send + Sync {
    async fn lookup(&self, port: u16) -> PortLookup;

    /// PID listening on `port`; inspection failures count as none
    async fn pid_on_port(&self, port: u16) -> Option<u32> {
        match self.lookup(port).await {
            PortLookup::Listening(pid) => Some(pid),
            PortLookup::Absent => None,
            PortLookup::Failed(reason) => {
                warn!(port, %reason, "Port inspection failed, treating as not listening");
                None
            }
        }
    }
}

/// Inspector backed by procfs and sysinfo
#[derive(Debug, Default, Clone)]
pub struct ProcInspector;

impl ProcInspector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessInspector for ProcInspector {
    async fn lookup(&self, port: u16) -> PortLookup {
        match tokio::task::spawn_blocking(move || lookup_blocking(port)).await {
            Ok(result) => result,
            Err(e) => PortLookup::Failed(format!("inspection task failed: {}", e)),
        }
    }
}

fn lookup_blocking(port: u16) -> PortLookup {
    let mut inodes = HashSet::new();
    let mut readable_tables = 0;

    for table in TCP_TABLES {
        match fs::read_to_string(table) {
            Ok(content) => {
                readable_tables += 1;
                inodes.extend(parse_listening_inodes(&content, port));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => debug!("Cannot read {}: {}", table, e),
        }
    }

    if readable_tables == 0 {
        return PortLookup::Failed("no readable TCP table in /proc/net".to_string());
    }
    if inodes.is_empty() {
        return PortLookup::Absent;
    }

    let mut system = System::new();
    system.refresh_processes();

    let mut denied = 0usize;
    for pid in system.processes().keys().map(|pid| pid.as_u32()) {
        match socket_inodes_for_pid(pid) {
            Ok(sockets) => {
                if sockets.iter().any(|inode| inodes.contains(inode)) {
                    let pid = thread_group_id(pid).unwrap_or(pid);
                    debug!(port, pid, "Found listening process");
                    return PortLookup::Listening(pid);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => denied += 1,
            // Process exited between enumeration and inspection
            Err(_) => continue,
        }
    }

    PortLookup::Failed(format!(
        "port {} is bound but its owner is not visible ({} processes not inspectable)",
        port, denied
    ))
}

/// Socket inodes in LISTEN state bound to `port`, from a /proc/net/tcp table
pub fn parse_listening_inodes(content: &str, port: u16) -> Vec<u64> {
    let mut inodes = Vec::new();

    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        // local_address is column 1 -> "0100007F:1F40"
        let Some((_ip, port_hex)) = parts[1].split_once(':') else {
            continue;
        };
        let Ok(local_port) = u16::from_str_radix(port_hex, 16) else {
            continue;
        };
        let Ok(state) = u8::from_str_radix(parts[3], 16) else {
            continue;
        };
        if local_port != port || state != TCP_LISTEN {
            continue;
        }

        // inode 0 belongs to sockets already torn down
        if let Ok(inode) = parts[9].parse::<u64>() {
            if inode != 0 {
                inodes.push(inode);
            }
        }
    }

    inodes
}

fn socket_inodes_for_pid(pid: u32) -> io::Result<HashSet<u64>> {
    let fd_path = format!("/proc/{}/fd", pid);
    let mut sockets = HashSet::new();

    for entry in fs::read_dir(Path::new(&fd_path))? {
        let Ok(entry) = entry else { continue };
        let Ok(target) = fs::read_link(entry.path()) else {
            continue;
        };
        if let Some(inode) = target.to_str().and_then(parse_socket_link) {
            sockets.insert(inode);
        }
    }

    Ok(sockets)
}

/// sysinfo also lists threads; report the owning process instead
fn thread_group_id(pid: u32) -> Option<u32> {
    let status = fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Tgid:"))
        .and_then(|tgid| tgid.trim().parse().ok())
}

/// Inode from an fd link target of the form `socket:[12345]`
fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TCP: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:1F40 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 51234 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1F41 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 51300 1 0000000000000000 100 0 0 10 0
   2: 0100007F:1F40 0100007F:C350 01 00000000:00000000 00:00000000 00000000  1000        0 51999 1 0000000000000000 20 4 30 10 -1
   3: 0100007F:1F40 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 0 1 0000000000000000 100 0 0 10 0
";

    #[test]
    fn test_parse_listening_inodes_filters_port_and_state() {
        // 0x1F40 = 8000, 0x1F41 = 8001
        assert_eq!(parse_listening_inodes(SAMPLE_TCP, 8000), vec![51234]);
        assert_eq!(parse_listening_inodes(SAMPLE_TCP, 8001), vec![51300]);
        assert!(parse_listening_inodes(SAMPLE_TCP, 9000).is_empty());
    }

    #[test]
    fn test_parse_ignores_garbage_lines() {
        let content = "header\nnot a table row\n 0: zz:zz 0 0A\n";
        assert!(parse_listening_inodes(content, 8000).is_empty());
    }

    #[test]
    fn test_parse_socket_link() {
        assert_eq!(parse_socket_link("socket:[51234]"), Some(51234));
        assert_eq!(parse_socket_link("pipe:[51234]"), None);
        assert_eq!(parse_socket_link("/dev/null"), None);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_finds_own_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let inspector = ProcInspector::new();
        assert_eq!(
            inspector.lookup(port).await,
            PortLookup::Listening(std::process::id())
        );
        assert_eq!(inspector.pid_on_port(port).await, Some(std::process::id()));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_unbound_port_is_absent() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let inspector = ProcInspector::new();
        assert_eq!(inspector.pid_on_port(port).await, None);
    }

    struct FailingInspector;

    #[async_trait]
    impl ProcessInspector for FailingInspector {
        async fn lookup(&self, _port: u16) -> PortLookup {
            PortLookup::Failed("permission denied".to_string())
        }
    }

    #[tokio::test]
    async fn test_failure_collapses_to_none() {
        assert_eq!(FailingInspector.pid_on_port(8000).await, None);
    }
}
