//! Process inspection and termination capability.
//!
//! `ProcessController` is the narrow boundary between the risk integrator
//! and the operating system's process table — the Rust equivalent of
//! `process_monitor.py`'s `get_process_info`/`kill_process` pair, backed by
//! `sysinfo` instead of `psutil`.

use sysinfo::{Pid, System};

/// Snapshot of process metadata, mirroring `process_monitor.py`'s
/// `ProcessInfo` dataclass.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub exe: String,
}

/// Capability boundary for inspecting and terminating processes. Exists so
/// `RiskIntegrator` can be tested with a fake controller instead of
/// actually killing things.
pub trait ProcessController: Send + Sync {
    fn process_info(&self, pid: u32) -> Option<ProcessInfo>;

    /// Attempts to kill `pid`. Returns `true` on success, `false` if the
    /// process could not be killed (already gone, permission denied).
    fn kill(&self, pid: u32) -> bool;
}

/// `sysinfo`-backed `ProcessController`.
pub struct SystemProcessController {
    system: std::sync::Mutex<System>,
}

impl SystemProcessController {
    pub fn new() -> Self {
        Self {
            system: std::sync::Mutex::new(System::new_all()),
        }
    }
}

impl Default for SystemProcessController {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessController for SystemProcessController {
    fn process_info(&self, pid: u32) -> Option<ProcessInfo> {
        let mut system = self.system.lock().ok()?;
        system.refresh_all();
        let sys_pid = Pid::from(pid as usize);
        let process = system.process(sys_pid)?;
        Some(ProcessInfo {
            pid,
            name: process.name().to_string(),
            exe: process.exe().to_string_lossy().into_owned(),
        })
    }

    fn kill(&self, pid: u32) -> bool {
        let mut system = match self.system.lock() {
            Ok(s) => s,
            Err(_) => return false,
        };
        system.refresh_all();
        let sys_pid = Pid::from(pid as usize);
        match system.process(sys_pid) {
            Some(process) => process.kill(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Test double that never touches the real process table.
    pub struct FakeProcessController {
        pub known: Vec<ProcessInfo>,
        pub killable: HashSet<u32>,
        pub killed: Mutex<HashSet<u32>>,
    }

    impl ProcessController for FakeProcessController {
        fn process_info(&self, pid: u32) -> Option<ProcessInfo> {
            self.known.iter().find(|p| p.pid == pid).cloned()
        }

        fn kill(&self, pid: u32) -> bool {
            if self.killable.contains(&pid) {
                self.killed.lock().unwrap().insert(pid);
                true
            } else {
                false
            }
        }
    }

    #[test]
    fn fake_controller_reports_killed_pids() {
        let controller = FakeProcessController {
            known: vec![ProcessInfo {
                pid: 42,
                name: "evil.exe".into(),
                exe: "/tmp/evil.exe".into(),
            }],
            killable: HashSet::from([42]),
            killed: Mutex::new(HashSet::new()),
        };
        assert!(controller.kill(42));
        assert!(!controller.kill(999));
        assert!(controller.killed.lock().unwrap().contains(&42));
    }

    #[test]
    fn real_controller_handles_unknown_pid_gracefully() {
        let controller = SystemProcessController::new();
        // Exceedingly unlikely to be a real PID.
        assert_eq!(controller.process_info(u32::MAX - 1), None);
        assert!(!controller.kill(u32::MAX - 1));
    }
}
