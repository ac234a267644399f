//! Description of the machine the solvers ran on.

use crate::namespace::Value;
use serde::Serialize;
use sysinfo::System;

#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    pub cpu: String,
    pub cpus: usize,
    /// Bytes
    pub memory: u64,
    pub swap: u64,
}

impl HostInfo {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();
        let unknown = || "unknown".to_string();
        let os = match (System::name(), System::os_version()) {
            (Some(n), Some(v)) => format!("{} {}", n, v),
            (Some(n), None) => n,
            _ => unknown(),
        };
        Self {
            hostname: System::host_name().unwrap_or_else(unknown),
            os,
            kernel: System::kernel_version().unwrap_or_else(unknown),
            cpu: sys
                .cpus()
                .first()
                .map(|c| c.brand().trim().to_string())
                .unwrap_or_else(unknown),
            cpus: sys.cpus().len(),
            memory: sys.total_memory(),
            swap: sys.total_swap(),
        }
    }

    /// Row of the `admin_host` table.
    pub fn row(&self) -> Vec<Value> {
        vec![
            Value::from(self.hostname.as_str()),
            Value::from(self.os.as_str()),
            Value::from(self.kernel.as_str()),
            Value::from(self.cpu.as_str()),
            Value::from(self.cpus),
            Value::from(self.memory),
            Value::from(self.swap),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::admin;

    #[test]
    fn row_fits_admin_host() {
        let host = HostInfo::collect();
        assert!(host.cpus >= 1);
        assert_eq!(host.row().len(), admin::descriptor(admin::HOST).unwrap().columns.len());
    }
}
