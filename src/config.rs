//! Configuration management for Nebula PDF Server

use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub vendors: VendorConfig,
    pub payments: PaymentConfig,
    pub credits: CreditConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for request bodies carrying files, in megabytes
    pub max_upload_mb: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    /// Public base URL objects can be fetched from (e.g. https://pub-xxxx.r2.dev)
    pub public_url: String,
    /// Lifetime of presigned upload URLs, in seconds
    pub presign_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Minio,
    R2,
    S3,
    B2,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorConfig {
    pub ilovepdf: Option<ILovePdfConfig>,
    pub pdfco: Option<PdfCoConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ILovePdfConfig {
    pub public_key: String,
    pub secret_key: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PdfCoConfig {
    pub api_key: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub razorpay: Option<RazorpayConfig>,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditConfig {
    pub max_free: u32,
    pub reset_hours: i64,
}

pub const DEFAULT_ILOVEPDF_API: &str = "https://api.ilovepdf.com";
pub const DEFAULT_PDFCO_API: &str = "https://api.pdf.co";
pub const DEFAULT_RAZORPAY_API: &str = "https://api.razorpay.com";

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                max_upload_mb: 100,
            },
            storage: StorageConfig {
                provider: StorageProvider::Minio,
                endpoint: "http://localhost:9000".to_string(),
                bucket: "nebula-pdf-uploads".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("us-east-1".to_string()),
                public_url: "http://localhost:9000/nebula-pdf-uploads".to_string(),
                presign_ttl_secs: 600,
            },
            database: DatabaseConfig {
                url: "sqlite:./nebula.db".to_string(),
            },
            vendors: VendorConfig::default(),
            payments: PaymentConfig {
                razorpay: None,
                currency: "INR".to_string(),
            },
            credits: CreditConfig::default(),
        }
    }
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            max_free: 3,
            reset_hours: 24,
        }
    }
}

impl StorageConfig {
    /// Endpoint URL handed to the S3 SDK
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint
    }

    /// Region, defaulting per provider (R2 only accepts "auto")
    pub fn region_or_default(&self) -> String {
        self.region.clone().unwrap_or_else(|| match self.provider {
            StorageProvider::R2 => "auto".to_string(),
            _ => "us-east-1".to_string(),
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let provider = match env::var("S3_PROVIDER").unwrap_or_else(|_| "r2".to_string()).as_str() {
            "minio" => StorageProvider::Minio,
            "s3" => StorageProvider::S3,
            "b2" => StorageProvider::B2,
            _ => StorageProvider::R2,
        };

        // R2 deployments only know their account id; derive the endpoint from it.
        let endpoint = match env::var("S3_ENDPOINT") {
            Ok(endpoint) => endpoint,
            Err(_) => {
                let account = env::var("R2_ACCOUNT_ID")?;
                format!("https://{}.r2.cloudflarestorage.com", account)
            }
        };

        let bucket = env::var("S3_BUCKET")
            .or_else(|_| env::var("R2_BUCKET_NAME"))
            .unwrap_or_else(|_| "nebula-pdf-uploads".to_string());

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
                max_upload_mb: env::var("MAX_UPLOAD_MB")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(100),
            },
            storage: StorageConfig {
                provider,
                endpoint,
                access_key: env::var("S3_ACCESS_KEY").or_else(|_| env::var("R2_ACCESS_KEY_ID"))?,
                secret_key: env::var("S3_SECRET_KEY")
                    .or_else(|_| env::var("R2_SECRET_ACCESS_KEY"))?,
                region: env::var("S3_REGION").ok(),
                public_url: env::var("S3_PUBLIC_URL")
                    .or_else(|_| env::var("R2_PUBLIC_URL"))
                    .unwrap_or_default()
                    .trim_end_matches('/')
                    .to_string(),
                presign_ttl_secs: env::var("PRESIGN_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(600),
                bucket,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./nebula.db".to_string()),
            },
            vendors: VendorConfig {
                ilovepdf: match (env::var("ILOVEPDF_PUBLIC_KEY"), env::var("ILOVEPDF_SECRET_KEY")) {
                    (Ok(public_key), Ok(secret_key)) => Some(ILovePdfConfig {
                        public_key,
                        secret_key,
                        api_base: env::var("ILOVEPDF_API_BASE")
                            .unwrap_or_else(|_| DEFAULT_ILOVEPDF_API.to_string()),
                    }),
                    _ => None,
                },
                pdfco: env::var("PDF_CO_API_KEY").ok().map(|api_key| PdfCoConfig {
                    api_key,
                    api_base: env::var("PDF_CO_API_BASE")
                        .unwrap_or_else(|_| DEFAULT_PDFCO_API.to_string()),
                }),
            },
            payments: PaymentConfig {
                razorpay: match (env::var("RAZORPAY_KEY_ID"), env::var("RAZORPAY_KEY_SECRET")) {
                    (Ok(key_id), Ok(key_secret)) => Some(RazorpayConfig {
                        key_id,
                        key_secret,
                        api_base: env::var("RAZORPAY_API_BASE")
                            .unwrap_or_else(|_| DEFAULT_RAZORPAY_API.to_string()),
                    }),
                    _ => None,
                },
                currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            },
            credits: CreditConfig {
                max_free: env::var("FREE_CREDITS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
                reset_hours: env::var("CREDIT_RESET_HOURS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(24),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_credit_policy_values() {
        let config = Config::default();
        assert_eq!(config.credits.max_free, 3);
        assert_eq!(config.credits.reset_hours, 24);
        assert!(config.vendors.ilovepdf.is_none());
        assert!(config.payments.razorpay.is_none());
    }

    #[test]
    fn test_region_defaults_per_provider() {
        let mut storage = Config::default().storage;
        storage.region = None;
        assert_eq!(storage.region_or_default(), "us-east-1");

        storage.provider = StorageProvider::R2;
        assert_eq!(storage.region_or_default(), "auto");
    }
}
