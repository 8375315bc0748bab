use crate::errors::AppError;

const DEFAULT_EXP_HOURS: i64 = 24;
const DEFAULT_PORT: u16 = 8000;

/// Process-wide settings, read once at startup and handed to the state
/// constructors. Nothing below the binaries reads the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_exp_hours: i64,
    /// Lower-cased addresses that are granted the admin role.
    pub admin_emails: Vec<String>,
    /// Firebase project used to verify federated ID tokens. `None` disables
    /// federated sign-in entirely.
    pub firebase_project_id: Option<String>,
    /// Reject Firebase tokens whose `email_verified` claim is not `true`.
    /// Off by default: federated sign-in links to an existing account by
    /// email, so turning this on closes linking through unverified addresses.
    pub firebase_require_verified_email: bool,
    pub port: u16,
}

impl AppConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt_exp_hours: DEFAULT_EXP_HOURS,
            admin_emails: Vec::new(),
            firebase_project_id: None,
            firebase_require_verified_email: false,
            port: DEFAULT_PORT,
        }
    }

    pub fn with_admin_emails<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.admin_emails = emails
            .into_iter()
            .map(|email| email.as_ref().trim().to_lowercase())
            .filter(|email| !email.is_empty())
            .collect();
        self
    }

    pub fn with_firebase_project(mut self, project_id: impl Into<String>) -> Self {
        self.firebase_project_id = Some(project_id.into());
        self
    }

    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        if secret.trim().is_empty() {
            return Err(AppError::configuration("JWT_SECRET must not be empty"));
        }

        let jwt_exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(DEFAULT_EXP_HOURS))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        let port = std::env::var("APP_PORT")
            .map(|val| val.parse::<u16>())
            .unwrap_or(Ok(DEFAULT_PORT))
            .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?;

        let admin_emails = std::env::var("ADMIN_EMAIL").unwrap_or_default();

        let firebase_project_id = std::env::var("FIREBASE_PROJECT_ID")
            .ok()
            .map(|val| val.trim().to_string())
            .filter(|val| !val.is_empty());

        let firebase_require_verified_email = std::env::var("FIREBASE_REQUIRE_VERIFIED_EMAIL")
            .map(|val| parse_flag(&val))
            .unwrap_or(false);

        let mut config = Self::new(secret).with_admin_emails(admin_emails.split(','));
        config.jwt_exp_hours = jwt_exp_hours;
        config.port = port;
        config.firebase_project_id = firebase_project_id;
        config.firebase_require_verified_email = firebase_require_verified_email;

        Ok(config)
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| *admin == email)
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
