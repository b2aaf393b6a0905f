use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use tracing::{error, info};

use hsm_mtls::api::{KeyAlias, Pin};
use hsm_mtls::ports::CredentialSelector;
use hsm_mtls::{
    AliasSelector, IdentitySource, IssuerAlgorithmSelector, Pkcs11Config, ProviderSettings,
    TrustSource,
};

#[derive(Parser, Debug)]
#[command(name = "hsm-mtls")]
#[command(
    about = "HTTPS client that authenticates with a certificate whose key lives in an HSM",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Path to the PKCS#11 module library
    #[arg(long, env = "HSM_MTLS_MODULE")]
    pub module: PathBuf,

    /// Index of the token slot to use
    #[arg(long, default_value_t = 0)]
    pub slot: usize,

    /// User PIN; omit to use the module's protected authentication path
    #[arg(long, env = "HSM_MTLS_PIN", hide_env_values = true)]
    pub pin: Option<String>,

    /// Label of the private key in the module
    #[arg(long, default_value = "badssl")]
    pub alias: String,

    /// PEM certificate chain issued for the key, leaf first
    #[arg(long)]
    pub cert: PathBuf,

    /// PEM bundle of trusted CA certificates
    #[arg(long, conflicts_with = "native_roots", required_unless_present = "native_roots")]
    pub trust_store: Option<PathBuf>,

    /// Passphrase for the trust bundle
    #[arg(long, requires = "trust_store")]
    pub trust_store_passphrase: Option<String>,

    /// Trust the platform's CA certificates
    #[arg(long)]
    pub native_roots: bool,

    /// How to pick the client certificate
    #[arg(long, default_value = "issuer")]
    pub selector: SelectorArg,

    /// Upper bound for one HSM signature, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub sign_timeout_ms: u64,

    /// Number of GET requests to issue
    #[arg(long, default_value_t = 10)]
    pub requests: usize,

    /// URL to fetch
    #[arg(default_value = "https://client.badssl.com")]
    pub url: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SelectorArg {
    /// Match the server's accepted issuers and signature schemes
    Issuer,
    /// Always present the key given with --alias
    Alias,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let alias = KeyAlias::new(cli.alias.as_str()).context("invalid key alias")?;
    let pin = cli
        .pin
        .as_deref()
        .map(Pin::new)
        .transpose()
        .context("invalid PIN")?;

    let trust = match cli.trust_store {
        Some(path) => TrustSource::Bundle {
            path,
            passphrase: cli.trust_store_passphrase,
        },
        None => TrustSource::Native,
    };

    let mut config = Pkcs11Config::new(&cli.module);
    config.slot_index = cli.slot;
    let settings = ProviderSettings {
        sign_timeout: Duration::from_millis(cli.sign_timeout_ms),
        ..ProviderSettings::default()
    };

    let provider = hsm_mtls::open_pkcs11_provider(config, pin.as_ref(), settings)
        .with_context(|| format!("failed to open HSM module {}", cli.module.display()))?;

    let selector: Arc<dyn CredentialSelector> = match cli.selector {
        SelectorArg::Issuer => Arc::new(IssuerAlgorithmSelector),
        SelectorArg::Alias => Arc::new(AliasSelector::new(alias.clone())),
    };
    let identity = IdentitySource {
        alias,
        certificate: cli.cert,
    };

    let session = hsm_mtls::secure_session(&provider, &trust, &[identity], Some(selector))
        .context("failed to set up the secure session")?;
    let transport =
        hsm_mtls::configure_transport(&session).context("failed to configure HTTP transport")?;

    let mut result = Ok(());
    for attempt in 1..=cli.requests {
        let response = transport
            .get(&cli.url)
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("request {} to {} failed", attempt, cli.url));

        match response {
            Ok(response) => {
                info!("Request {}: {} bytes", attempt, response.body.len());
                println!("{}", response.status);
            }
            Err(e) => {
                error!("{:#}", e);
                result = Err(e);
                break;
            }
        }
    }

    if let Err(e) = provider.shutdown() {
        error!("Failed to close HSM session: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use assert_cmd::Command;

    #[test]
    fn test_cli_version_parameter() {
        let mut cmd = Command::cargo_bin("hsm-mtls").unwrap();
        let assert = cmd.arg("--version").assert();
        assert.success();
    }

    #[test]
    fn test_cli_requires_certificate() {
        let mut cmd = Command::cargo_bin("hsm-mtls").unwrap();
        let assert = cmd
            .env_remove("HSM_MTLS_MODULE")
            .arg("--module")
            .arg("/nonexistent/libpkcs11.so")
            .arg("--native-roots")
            .assert();
        assert.failure();
    }

    #[test]
    fn test_cli_missing_module_fails_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("client.pem");
        std::fs::write(&cert, "").unwrap();

        let mut cmd = Command::cargo_bin("hsm-mtls").unwrap();
        let output = cmd
            .arg("--module")
            .arg("/nonexistent/libpkcs11.so")
            .arg("--cert")
            .arg(&cert)
            .arg("--native-roots")
            .arg("--pin")
            .arg("123456")
            .output()
            .unwrap();

        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.contains("failed to open HSM module"),
            "stderr: {}",
            stderr
        );
    }

    #[test]
    #[cfg_attr(not(feature = "hardware-tests"), ignore)] // Requires a PKCS#11 module and network access - enable with: --features hardware-tests
    fn test_cli_badssl_client_certificate() {
        let cert = std::env::var("HSM_MTLS_CERT").unwrap_or_else(|_| "badssl.com-client.pem".into());

        let mut cmd = Command::cargo_bin("hsm-mtls").unwrap();
        let assert = cmd
            .arg("--cert")
            .arg(cert)
            .arg("--native-roots")
            .arg("--requests")
            .arg("1")
            .assert();

        let assert = assert.success();
        let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
        assert_eq!(stdout.trim(), "200");
    }
}
