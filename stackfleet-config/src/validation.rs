use thiserror::Error;

use super::models::Config;

/// Fleet sizes above this are accepted but flagged.
const LARGE_FLEET: u32 = 50;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("waiter poll_interval must be greater than zero")]
    ZeroPollInterval,
    #[error("waiter max_failures must be at least 1")]
    ZeroMaxFailures,
    #[error("rebuild max_attempts must be at least 1")]
    ZeroRebuildAttempts,
    #[error(
        "waiter deadline_margin ({margin:?}) must be shorter than the budget ({budget:?})"
    )]
    MarginExceedsBudget {
        margin: std::time::Duration,
        budget: std::time::Duration,
    },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.waiter.poll_interval.is_zero() {
        return Err(ConfigGuardRailError::ZeroPollInterval);
    }
    if config.waiter.max_failures == 0 {
        return Err(ConfigGuardRailError::ZeroMaxFailures);
    }
    if config.rebuild.max_attempts == 0 {
        return Err(ConfigGuardRailError::ZeroRebuildAttempts);
    }
    if config.waiter.deadline_margin >= config.waiter.budget {
        return Err(ConfigGuardRailError::MarginExceedsBudget {
            margin: config.waiter.deadline_margin,
            budget: config.waiter.budget,
        });
    }

    if config.fleet.num_students == 0 {
        warnings.push("NumStudents is 0; the validate pass has nothing to do");
    } else if config.fleet.num_students > LARGE_FLEET {
        warnings.push_with_hint(
            format!(
                "NumStudents is {}; a single invocation may not finish its \
                 pass within the time limit",
                config.fleet.num_students
            ),
            "Later validate ticks pick up whatever one pass leaves behind",
        );
    }

    if config.student_template.is_none() {
        warnings.push_with_hint(
            "QSS3BucketName/StudentTemplate not set; rebuilds can only use \
             stored snapshots",
            "Set QSS3BucketName, QSS3KeyPrefix and StudentTemplate",
        );
    }

    if config.secrets.pull_secret.is_none() || config.secrets.ssh_key.is_none()
    {
        warnings.push_with_hint(
            "PULL_SECRET or SSH_KEY not set in the environment",
            "GenerateIgnition requests must then carry PullSecret and SSHKey",
        );
    }

    if !config.openshift.mirror_url.starts_with("https://") {
        warnings.push(format!(
            "OpenShiftMirrorURL '{}' is not HTTPS; downloads are only \
             protected by the published checksums",
            config.openshift.mirror_url
        ));
    }

    Ok(warnings)
}
