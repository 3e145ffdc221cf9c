use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub whereby_api_key: String,
    pub whereby_api_base_url: String,
    pub notification_webhook_url: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            whereby_api_key: env::var("WHEREBY_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("WHEREBY_API_KEY not set, video rooms disabled");
                    String::new()
                }),
            whereby_api_base_url: env::var("WHEREBY_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.whereby.dev/v1".to_string()),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .unwrap_or_else(|_| {
                    warn!("NOTIFICATION_WEBHOOK_URL not set, notifications disabled");
                    String::new()
                }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_video_configured(&self) -> bool {
        !self.whereby_api_key.is_empty() && !self.whereby_api_base_url.is_empty()
    }

    pub fn is_notifications_configured(&self) -> bool {
        !self.notification_webhook_url.is_empty()
    }
}
