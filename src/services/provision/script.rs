//! Provisioning script synthesis
//!
//! Builds the privileged activation script as a fixed list of shell steps and
//! renders it to text once. The agent never runs it: a trusted operator does,
//! with root privileges the agent does not hold.
//!
//! Domain and username are interpolated verbatim and are only safe because the
//! validator restricts them to `[a-z0-9.-]` and `[a-z0-9_-]`. Paths and the admin
//! email come from configuration and go through `shell_quote`.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::ProvisionError;

use super::staging::ensure_dir;

/// Script directory mode: owner/group only
pub const SCRIPT_DIR_MODE: u32 = 0o750;

/// Script file mode: owner/group may execute, no world access
pub const SCRIPT_FILE_MODE: u32 = 0o750;

/// Web server reload command, run twice
const RELOAD_SERVER: [&str; 3] = ["systemctl", "reload", "apache2"];

/// A single step of the activation script
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellStep {
    /// Comment line above the command
    pub comment: &'static str,
    /// Optional progress message echoed before the command
    pub announce: Option<String>,
    /// Program and arguments
    pub argv: Vec<String>,
}

impl ShellStep {
    fn new(comment: &'static str, argv: &[&str]) -> Self {
        Self {
            comment,
            announce: None,
            argv: argv.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn announce(mut self, message: impl Into<String>) -> Self {
        self.announce = Some(message.into());
        self
    }

    /// Program name of this step
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// The command line as it appears in the script
    pub fn command_line(&self) -> String {
        self.argv
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Activation script for one site
#[derive(Clone, Debug)]
pub struct ProvisioningScript {
    domain: String,
    username: String,
    steps: Vec<ShellStep>,
}

impl ProvisioningScript {
    /// Build the five activation steps in order: move config, enable site,
    /// reload, request certificate, reload
    pub fn build(
        domain: &str,
        username: &str,
        staged_config_path: &Path,
        target_config_path: &Path,
        admin_email: &str,
    ) -> Self {
        let staged = staged_config_path.to_string_lossy().into_owned();
        let target = target_config_path.to_string_lossy().into_owned();
        let conf_file = target_config_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{domain}.conf"));
        let www = format!("www.{domain}");

        let steps = vec![
            ShellStep::new("Move vhost config into place", &["mv", staged.as_str(), target.as_str()]),
            ShellStep::new("Enable the site", &["a2ensite", conf_file.as_str()]),
            ShellStep::new("Reload Apache to activate the HTTP site", &RELOAD_SERVER)
                .announce("Reloading Apache to activate HTTP site..."),
            ShellStep::new(
                "Obtain Let's Encrypt certificate",
                &[
                    "certbot",
                    "--apache",
                    "-d",
                    domain,
                    "-d",
                    www.as_str(),
                    "--non-interactive",
                    "--agree-tos",
                    "-m",
                    admin_email,
                    "--redirect",
                ],
            )
            .announce(format!("Requesting Let's Encrypt certificate for {domain}...")),
            ShellStep::new("Reload Apache with the certificate in place", &RELOAD_SERVER),
        ];

        Self {
            domain: domain.to_string(),
            username: username.to_string(),
            steps,
        }
    }

    /// `provision_<domain>.sh`
    pub fn file_name(domain: &str) -> String {
        format!("provision_{domain}.sh")
    }

    pub fn steps(&self) -> &[ShellStep] {
        &self.steps
    }

    /// Render the script text. `set -e` makes it stop at the first failing step.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("#!/bin/sh\n");
        out.push_str(&format!(
            "# Activation script for {} (user {})\n",
            self.domain, self.username
        ));
        out.push_str("# Generated by site-provision-agent. Run as root.\n");
        out.push_str("set -e\n\n");
        out.push_str(&echo_line(&format!(
            "--- Running provisioning for {} (user {}) ---",
            self.domain, self.username
        )));

        for step in &self.steps {
            out.push('\n');
            out.push_str(&format!("# {}\n", step.comment));
            if let Some(message) = &step.announce {
                out.push_str(&echo_line(message));
            }
            out.push_str(&step.command_line());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&echo_line(&format!(
            "--- Provisioning for {} complete ---",
            self.domain
        )));
        out
    }
}

/// Script synthesizer
pub struct ScriptSynthesizer;

impl ScriptSynthesizer {
    /// Write `provision_<domain>.sh` into `target_dir` and return its path.
    ///
    /// Overwrites a previous script for the same domain.
    pub async fn synthesize(
        target_dir: &Path,
        domain: &str,
        username: &str,
        staged_config_path: &Path,
        target_config_path: &Path,
        admin_email: &str,
    ) -> Result<PathBuf, ProvisionError> {
        ensure_dir(target_dir, SCRIPT_DIR_MODE)
            .await
            .map_err(|source| ProvisionError::ScriptGeneration {
                path: target_dir.to_path_buf(),
                source,
            })?;

        let script = ProvisioningScript::build(
            domain,
            username,
            staged_config_path,
            target_config_path,
            admin_email,
        );
        let script_path = target_dir.join(ProvisioningScript::file_name(domain));

        let to_error = |source| ProvisionError::ScriptGeneration {
            path: script_path.clone(),
            source,
        };
        fs::write(&script_path, script.render()).await.map_err(to_error)?;
        set_script_mode(&script_path).await.map_err(to_error)?;

        tracing::debug!(path = %script_path.display(), steps = script.steps().len(), "Wrote provisioning script");
        Ok(script_path)
    }
}

#[cfg(unix)]
async fn set_script_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(SCRIPT_FILE_MODE)).await
}

#[cfg(not(unix))]
async fn set_script_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn echo_line(message: &str) -> String {
    format!("echo {}\n", shell_quote(message))
}

/// Quote an argument for POSIX sh. Words made only of safe characters are
/// left as-is so the script stays readable.
pub fn shell_quote(arg: &str) -> String {
    let is_safe = |c: char| c.is_ascii_alphanumeric() || "._-/@%+=:,".contains(c);
    if !arg.is_empty() && arg.chars().all(is_safe) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProvisioningScript {
        ProvisioningScript::build(
            "site1.test",
            "user_1",
            Path::new("/tmp/vhostAb12Cd.conf"),
            Path::new("/etc/apache2/sites-available/site1.test.conf"),
            "admin@example.com",
        )
    }

    #[test]
    fn test_file_name() {
        assert_eq!(ProvisioningScript::file_name("site1.test"), "provision_site1.test.sh");
    }

    #[test]
    fn test_steps_in_order() {
        let script = sample();
        let programs: Vec<&str> = script.steps().iter().map(|s| s.program()).collect();
        assert_eq!(programs, ["mv", "a2ensite", "systemctl", "certbot", "systemctl"]);

        let lines: Vec<String> = script.steps().iter().map(|s| s.command_line()).collect();
        assert_eq!(
            lines[0],
            "mv /tmp/vhostAb12Cd.conf /etc/apache2/sites-available/site1.test.conf"
        );
        assert_eq!(lines[1], "a2ensite site1.test.conf");
        assert_eq!(lines[2], "systemctl reload apache2");
        assert_eq!(
            lines[3],
            "certbot --apache -d site1.test -d www.site1.test --non-interactive --agree-tos -m admin@example.com --redirect"
        );
        assert_eq!(lines[4], "systemctl reload apache2");
    }

    #[test]
    fn test_render_shape() {
        let text = sample().render();
        assert!(text.starts_with("#!/bin/sh\n"));
        assert!(text.contains("\nset -e\n"));
        assert!(text.contains("user_1"));

        // set -e 必须在第一条命令之前
        let set_e = text.find("set -e").unwrap();
        let mut last = set_e;
        for step in sample().steps() {
            let pos = text[last..].find(&step.command_line()).unwrap() + last;
            assert!(pos > last);
            last = pos;
        }
        assert!(text.ends_with("echo '--- Provisioning for site1.test complete ---'\n"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("site1.test"), "site1.test");
        assert_eq!(shell_quote("/var/www/app"), "/var/www/app");
        assert_eq!(shell_quote("my dir"), "'my dir'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$(reboot)"), "'$(reboot)'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_paths_with_spaces_are_quoted() {
        let script = ProvisioningScript::build(
            "a.test",
            "bob_",
            Path::new("/tmp/staging dir/vhost1.conf"),
            Path::new("/etc/apache2/sites-available/a.test.conf"),
            "admin@example.com",
        );
        assert_eq!(
            script.steps()[0].command_line(),
            "mv '/tmp/staging dir/vhost1.conf' /etc/apache2/sites-available/a.test.conf"
        );
    }

    #[tokio::test]
    async fn test_synthesize_writes_script() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("provisioning_scripts");

        let path = ScriptSynthesizer::synthesize(
            &scripts,
            "site1.test",
            "user_1",
            Path::new("/tmp/vhostX.conf"),
            Path::new("/etc/apache2/sites-available/site1.test.conf"),
            "admin@example.com",
        )
        .await
        .unwrap();

        assert_eq!(path, scripts.join("provision_site1.test.sh"));
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("certbot --apache -d site1.test -d www.site1.test"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, SCRIPT_FILE_MODE);
        }
    }

    #[tokio::test]
    async fn test_synthesize_overwrites_previous_script() {
        let dir = tempfile::tempdir().unwrap();
        let target = Path::new("/etc/apache2/sites-available/site1.test.conf");

        let first = ScriptSynthesizer::synthesize(
            dir.path(),
            "site1.test",
            "user_1",
            Path::new("/tmp/vhostOLD.conf"),
            target,
            "admin@example.com",
        )
        .await
        .unwrap();
        let second = ScriptSynthesizer::synthesize(
            dir.path(),
            "site1.test",
            "user_1",
            Path::new("/tmp/vhostNEW.conf"),
            target,
            "admin@example.com",
        )
        .await
        .unwrap();

        assert_eq!(first, second);
        let text = tokio::fs::read_to_string(&second).await.unwrap();
        assert!(text.contains("vhostNEW"));
        assert!(!text.contains("vhostOLD"));
    }

    #[tokio::test]
    async fn test_synthesize_dir_collides_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("scripts");
        tokio::fs::write(&not_a_dir, "x").await.unwrap();

        let err = ScriptSynthesizer::synthesize(
            &not_a_dir,
            "site1.test",
            "user_1",
            Path::new("/tmp/vhostX.conf"),
            Path::new("/etc/apache2/sites-available/site1.test.conf"),
            "admin@example.com",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProvisionError::ScriptGeneration { .. }));
    }
}
