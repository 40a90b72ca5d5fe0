//! Per-tenant identity directories, app clients and hosted login domains

use serde::{Deserialize, Serialize};

/// MFA setting
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MfaConfiguration {
    /// MFA disabled
    Off,
    /// MFA optional per user
    Optional,
    /// MFA required
    On,
}

/// Password policy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordPolicy {
    /// Minimum length
    pub minimum_length: u32,
    /// Require a lowercase letter
    pub require_lowercase: bool,
    /// Require an uppercase letter
    pub require_uppercase: bool,
    /// Require a digit
    pub require_numbers: bool,
    /// Require a symbol
    pub require_symbols: bool,
    /// Days an admin-issued temporary password stays valid
    pub temporary_password_validity_days: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            minimum_length: 8,
            require_lowercase: true,
            require_uppercase: true,
            require_numbers: true,
            require_symbols: true,
            temporary_password_validity_days: 30,
        }
    }
}

/// String attribute in the directory schema
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAttribute {
    /// Attribute name (custom attributes surface as `custom:<name>`)
    pub name: String,
    /// Required at sign-up
    pub required: bool,
    /// Updatable after creation
    pub mutable: bool,
    /// Minimum value length
    pub min_length: u32,
    /// Maximum value length
    pub max_length: u32,
}

/// Identity directory (user pool)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPool {
    /// Pool name
    pub user_pool_name: String,
    /// Only administrators create users
    pub allow_admin_create_user_only: bool,
    /// MFA
    pub mfa_configuration: MfaConfiguration,
    /// Password rules
    pub password_policy: PasswordPolicy,
    /// Attribute schema
    pub schema: Vec<SchemaAttribute>,
    /// Usernames are case sensitive
    pub username_case_sensitive: bool,
}

impl UserPool {
    /// Admin-managed pool with a required email and an optional tenant id
    pub fn admin_managed(user_pool_name: impl Into<String>) -> Self {
        Self {
            user_pool_name: user_pool_name.into(),
            allow_admin_create_user_only: true,
            mfa_configuration: MfaConfiguration::Off,
            password_policy: PasswordPolicy::default(),
            schema: vec![
                SchemaAttribute {
                    name: "email".to_string(),
                    required: true,
                    mutable: true,
                    min_length: 1,
                    max_length: 64,
                },
                SchemaAttribute {
                    name: "tenantid".to_string(),
                    required: false,
                    mutable: true,
                    min_length: 1,
                    max_length: 20,
                },
            ],
            username_case_sensitive: false,
        }
    }
}

/// Token lifetimes, in minutes
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidity {
    /// Access token lifetime
    pub access_token_minutes: u32,
    /// ID token lifetime
    pub id_token_minutes: u32,
    /// Refresh token lifetime
    pub refresh_token_minutes: u32,
}

/// OAuth settings of an app client
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSettings {
    /// Allowed grant flows
    pub flows: Vec<String>,
    /// Allowed scopes
    pub scopes: Vec<String>,
    /// Redirect targets after login
    pub callback_urls: Vec<String>,
    /// Redirect targets after logout
    pub logout_urls: Vec<String>,
}

/// App client of an identity directory
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPoolClient {
    /// Owning pool id
    pub user_pool_id: String,
    /// Client name
    pub client_name: String,
    /// Generate a client secret
    pub generate_secret: bool,
    /// Token lifetimes
    pub token_validity: TokenValidity,
    /// Attributes the client may read
    pub read_attributes: Vec<String>,
    /// Explicit auth flows
    pub explicit_auth_flows: Vec<String>,
    /// Hide whether a user exists on failed sign-in
    pub prevent_user_existence_errors: bool,
    /// Identity providers
    pub supported_identity_providers: Vec<String>,
    /// OAuth settings
    pub oauth: OAuthSettings,
}

impl UserPoolClient {
    /// Confidential code-flow client for the web app served at `app_url`
    pub fn web_app(
        user_pool_id: impl Into<String>,
        client_name: impl Into<String>,
        app_url: &str,
    ) -> Self {
        Self {
            user_pool_id: user_pool_id.into(),
            client_name: client_name.into(),
            generate_secret: true,
            token_validity: TokenValidity {
                access_token_minutes: 60,
                id_token_minutes: 60,
                refresh_token_minutes: 60,
            },
            read_attributes: vec![
                "custom:tenantid".to_string(),
                "email".to_string(),
                "email_verified".to_string(),
            ],
            explicit_auth_flows: vec!["ALLOW_REFRESH_TOKEN_AUTH".to_string()],
            prevent_user_existence_errors: true,
            supported_identity_providers: vec!["COGNITO".to_string()],
            oauth: OAuthSettings {
                flows: vec!["code".to_string()],
                scopes: vec!["openid".to_string()],
                callback_urls: vec![format!("{}/oauth2/callback", app_url)],
                logout_urls: vec![app_url.to_string()],
            },
        }
    }
}

/// Hosted login domain of an identity directory
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPoolDomain {
    /// Owning pool id
    pub user_pool_id: String,
    /// Domain prefix (`<prefix>.auth.<region>.amazoncognito.com`)
    pub domain: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_managed_pool() {
        let pool = UserPool::admin_managed("tenanta");
        assert!(pool.allow_admin_create_user_only);
        assert_eq!(pool.mfa_configuration, MfaConfiguration::Off);
        assert_eq!(pool.password_policy.minimum_length, 8);
        assert!(!pool.username_case_sensitive);
        let tenantid = pool.schema.iter().find(|a| a.name == "tenantid").unwrap();
        assert!(!tenantid.required);
        assert_eq!(tenantid.max_length, 20);
    }

    #[test]
    fn web_app_client_only_allows_refresh_flow() {
        let client = UserPoolClient::web_app("pool", "tenanta-app-client", "https://tenanta.example.com");
        assert_eq!(client.explicit_auth_flows, vec!["ALLOW_REFRESH_TOKEN_AUTH"]);
        assert_eq!(client.token_validity.access_token_minutes, 60);
        assert_eq!(
            client.oauth.callback_urls,
            vec!["https://tenanta.example.com/oauth2/callback"]
        );
        assert_eq!(client.oauth.logout_urls, vec!["https://tenanta.example.com"]);
        assert!(client.generate_secret);
    }
}
