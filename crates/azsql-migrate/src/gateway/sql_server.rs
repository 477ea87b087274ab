//! [`VerificationGateway`] for SQL Server / Azure SQL using tiberius.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tiberius::numeric::Numeric;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::{QueryCounts, VerificationGateway};
use crate::config::MigrationOptions;
use crate::credential::Credential;
use crate::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs verification probes over a direct TDS connection.
#[derive(Debug, Clone)]
pub struct SqlServerVerifier {
    port: u16,
    trust_server_certificate: bool,
}

impl SqlServerVerifier {
    /// Creates a verifier using the port and TLS settings in `options`.
    pub fn new(options: &MigrationOptions) -> Self {
        Self {
            port: options.sql_port,
            trust_server_certificate: options.trust_server_certificate,
        }
    }

    fn build_config(&self, server: &str, database: &str, credential: &Credential) -> Config {
        let mut config = Config::new();
        config.host(server);
        config.port(self.port);
        config.database(database);
        config.authentication(AuthMethod::sql_server(
            credential.admin_name(),
            credential.admin_password(),
        ));
        if self.trust_server_certificate {
            config.trust_cert();
        }
        config.encryption(EncryptionLevel::Required);
        config
    }

    async fn open(config: Config) -> Result<Client<Compat<TcpStream>>> {
        let tcp = TcpStream::connect(config.get_addr()).await?;
        tcp.set_nodelay(true).ok();

        match Client::connect(config.clone(), tcp.compat_write()).await {
            Ok(client) => Ok(client),
            // Azure SQL gateways may redirect to the node hosting the database.
            Err(tiberius::error::Error::Routing { host, port }) => {
                debug!("Redirected to {}:{}", host, port);
                let mut config = config;
                config.host(&host);
                config.port(port);
                let tcp = TcpStream::connect(config.get_addr()).await?;
                tcp.set_nodelay(true).ok();
                Ok(Client::connect(config, tcp.compat_write()).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn connect(
        &self,
        server: &str,
        database: &str,
        credential: &Credential,
    ) -> Result<Client<Compat<TcpStream>>> {
        let config = self.build_config(server, database, credential);
        tokio::time::timeout(CONNECT_TIMEOUT, Self::open(config))
            .await
            .map_err(|_| {
                Error::Sql(format!(
                    "connection to {server},{database} timed out after {}s",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
    }
}

#[async_trait]
impl VerificationGateway for SqlServerVerifier {
    async fn counts(
        &self,
        server: &str,
        database: &str,
        credential: &Credential,
        queries: &[String],
    ) -> Result<QueryCounts> {
        let mut client = self.connect(server, database, credential).await?;
        let mut counts = HashMap::with_capacity(queries.len());

        for query in queries {
            let row = client.simple_query(query.as_str()).await?.into_row().await?;
            let row = row.ok_or_else(|| Error::Sql(format!("query '{query}' returned no rows")))?;
            let value = scalar_to_i64(query, &row)?;
            debug!("{},{}: {} = {}", server, database, query, value);
            counts.insert(query.clone(), value);
        }

        client.close().await?;
        Ok(counts)
    }
}

fn null_result(query: &str) -> Error {
    Error::Sql(format!("query '{query}' returned NULL"))
}

/// Reads the first column of `row` as a 64-bit integer.
fn scalar_to_i64(query: &str, row: &Row) -> Result<i64> {
    if let Ok(v) = row.try_get::<i64, _>(0) {
        return v.ok_or_else(|| null_result(query));
    }
    if let Ok(v) = row.try_get::<i32, _>(0) {
        return v.map(i64::from).ok_or_else(|| null_result(query));
    }
    if let Ok(v) = row.try_get::<i16, _>(0) {
        return v.map(i64::from).ok_or_else(|| null_result(query));
    }
    if let Ok(v) = row.try_get::<u8, _>(0) {
        return v.map(i64::from).ok_or_else(|| null_result(query));
    }
    if let Ok(v) = row.try_get::<Numeric, _>(0) {
        let n = v.ok_or_else(|| null_result(query))?;
        return numeric_to_i64(query, n.value(), n.scale());
    }
    if let Ok(v) = row.try_get::<f64, _>(0) {
        return float_to_i64(query, v.ok_or_else(|| null_result(query))?);
    }
    if let Ok(v) = row.try_get::<f32, _>(0) {
        return float_to_i64(query, f64::from(v.ok_or_else(|| null_result(query))?));
    }
    if let Ok(v) = row.try_get::<bool, _>(0) {
        return v.map(i64::from).ok_or_else(|| null_result(query));
    }
    Err(Error::Sql(format!("query '{query}' did not return a number")))
}

/// Converts an unscaled decimal into an integer, refusing fractions and
/// values outside the `i64` range.
pub(crate) fn numeric_to_i64(query: &str, value: i128, scale: u8) -> Result<i64> {
    let truncated = || Error::Truncation {
        query: query.to_string(),
        value: render_decimal(value, scale),
    };

    let divisor = 10i128.checked_pow(u32::from(scale)).ok_or_else(truncated)?;
    if value % divisor != 0 {
        return Err(truncated());
    }
    i64::try_from(value / divisor).map_err(|_| truncated())
}

/// Converts a float into an integer, refusing fractions, NaN and values
/// outside the `i64` range.
pub(crate) fn float_to_i64(query: &str, value: f64) -> Result<i64> {
    // 2^63 is exactly representable; anything at or above it overflows.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if !value.is_finite() || value.fract() != 0.0 || value >= LIMIT || value < -LIMIT {
        return Err(Error::Truncation {
            query: query.to_string(),
            value: value.to_string(),
        });
    }
    #[allow(clippy::cast_possible_truncation)] // range checked above
    Ok(value as i64)
}

fn render_decimal(value: i128, scale: u8) -> String {
    if scale == 0 {
        return value.to_string();
    }
    let scale = usize::from(scale);
    let digits = format!("{:0>width$}", value.unsigned_abs(), width = scale + 1);
    let (int_part, frac_part) = digits.split_at(digits.len() - scale);
    let sign = if value < 0 { "-" } else { "" };
    format!("{sign}{int_part}.{frac_part}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_whole_values_convert() {
        assert_eq!(numeric_to_i64("q", 4200, 2).unwrap(), 42);
        assert_eq!(numeric_to_i64("q", -7, 0).unwrap(), -7);
    }

    #[test]
    fn test_numeric_fraction_is_truncation() {
        let err = numeric_to_i64("SELECT AVG(x)", 12345, 2).unwrap_err();
        match err {
            Error::Truncation { query, value } => {
                assert_eq!(query, "SELECT AVG(x)");
                assert_eq!(value, "123.45");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_numeric_out_of_range_is_truncation() {
        let big = i128::from(i64::MAX) + 1;
        assert!(matches!(
            numeric_to_i64("q", big, 0),
            Err(Error::Truncation { .. })
        ));
    }

    #[test]
    fn test_wide_counts_are_not_narrowed() {
        // Counts beyond the 16-bit range used to wrap silently.
        assert_eq!(numeric_to_i64("q", 70_000, 0).unwrap(), 70_000);
        assert_eq!(float_to_i64("q", 5_000_000_000.0).unwrap(), 5_000_000_000);
    }

    #[test]
    fn test_float_fraction_and_nan_are_truncation() {
        assert!(matches!(float_to_i64("q", 1.5), Err(Error::Truncation { .. })));
        assert!(matches!(
            float_to_i64("q", f64::NAN),
            Err(Error::Truncation { .. })
        ));
        assert!(matches!(float_to_i64("q", 1e19), Err(Error::Truncation { .. })));
    }

    #[test]
    fn test_render_decimal() {
        assert_eq!(render_decimal(5, 3), "0.005");
        assert_eq!(render_decimal(-12345, 2), "-123.45");
        assert_eq!(render_decimal(99, 0), "99");
    }

    #[test]
    fn test_build_config_address() {
        let verifier = SqlServerVerifier::new(&MigrationOptions::default());
        let credential = Credential::new("admin", "secret").unwrap();

        let config = verifier.build_config("srv.database.windows.net", "orders", &credential);

        assert_eq!(config.get_addr(), "srv.database.windows.net:1433");
    }
}
