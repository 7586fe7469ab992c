//! TOOLKIT: Host information

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ToolArgs, ToolDescriptor, ToolTrait};
use crate::Result;

/// Reports operating system, architecture and host name
pub struct SystemInfoTool;

#[async_trait]
impl ToolTrait for SystemInfoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "system_info",
            "Return server OS information including platform and architecture.",
        )
    }

    async fn execute(&self, _args: ToolArgs, _cancel: &CancellationToken) -> Result<String> {
        let mut lines = vec![
            format!("System: {} ({})", std::env::consts::OS, std::env::consts::FAMILY),
            format!("Arch: {}", std::env::consts::ARCH),
        ];
        if let Ok(release) = tokio::fs::read_to_string("/proc/sys/kernel/osrelease").await {
            lines.push(format!("Release: {}", release.trim()));
        }
        if let Ok(host) = tokio::fs::read_to_string("/proc/sys/kernel/hostname").await {
            lines.push(format!("Host: {}", host.trim()));
        }
        Ok(lines.join("\n"))
    }
}
