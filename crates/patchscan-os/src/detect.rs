//! OS family detection from `/etc/os-release`

use crate::exec::RemoteExecutor;
use patchscan_core::Result;
use tracing::debug;

/// Family and release read from the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedOs {
    pub family: String,
    pub release: String,
}

/// Detect the OS family of a target
///
/// Returns `Ok(None)` when the file is missing or names no `ID`; only
/// transport failures are errors.
pub async fn detect_os(exec: &dyn RemoteExecutor) -> Result<Option<DetectedOs>> {
    let out = exec.run("cat /etc/os-release").await?;
    if !out.success() {
        debug!("/etc/os-release not readable (exit {})", out.exit_status);
        return Ok(None);
    }
    Ok(parse_os_release(&out.stdout))
}

/// Parse the `KEY=value` lines of an os-release file
pub fn parse_os_release(content: &str) -> Option<DetectedOs> {
    let mut id = None;
    let mut version_id = String::new();

    for line in content.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key {
            "ID" => id = Some(value.to_ascii_lowercase()),
            "VERSION_ID" => version_id = value.to_string(),
            _ => {}
        }
    }

    let id = id.filter(|s| !s.is_empty())?;
    Some(DetectedOs {
        family: normalize_family(&id).to_string(),
        release: version_id,
    })
}

/// Map os-release IDs onto registry family names
fn normalize_family(id: &str) -> &str {
    match id {
        "rhel" => "redhat",
        "ol" => "oracle",
        "amzn" => "amazon",
        "almalinux" => "alma",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExecutor;

    #[test]
    fn test_parse_os_release() {
        let ubuntu = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nID_LIKE=debian\n";
        assert_eq!(
            parse_os_release(ubuntu),
            Some(DetectedOs {
                family: "ubuntu".into(),
                release: "22.04".into()
            })
        );

        let rhel = "ID=\"rhel\"\nVERSION_ID=\"9.2\"\n";
        assert_eq!(parse_os_release(rhel).unwrap().family, "redhat");

        let amzn = "ID=\"amzn\"\nVERSION_ID=\"2023\"\n";
        assert_eq!(parse_os_release(amzn).unwrap().family, "amazon");

        assert_eq!(parse_os_release("garbage\n"), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_an_error() {
        let exec = ScriptedExecutor::new().on_stderr("cat /etc/os-release", "No such file", 1);
        assert_eq!(detect_os(&exec).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        let exec = ScriptedExecutor::new().fail("cat /etc/os-release", "connection refused");
        assert!(detect_os(&exec).await.is_err());
    }
}
