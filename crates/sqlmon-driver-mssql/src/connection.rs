//! SQL Server connection implementation using tiberius

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlmon_core::{
    ColumnMeta, Connection, ConnectionConfig, QueryResult, Result, Row, SqlmonError,
    StatementResult, Value,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Row as TiberiusRow};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use uuid::Uuid;

/// SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MssqlConnectionError> for SqlmonError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::Tiberius(tiberius::error::Error::Server(token)) => {
                SqlmonError::Query(format!("{} (error {})", token.message(), token.code()))
            }
            MssqlConnectionError::QueryFailed(msg) => SqlmonError::Query(msg),
            MssqlConnectionError::TypeConversion(msg) => SqlmonError::Decode(msg),
            MssqlConnectionError::Timeout(limit) => {
                SqlmonError::Timeout(format!("query exceeded {:?}", limit))
            }
            MssqlConnectionError::ConnectionFailed(msg) => {
                SqlmonError::Connection(format!("Connection failed: {}", msg))
            }
            MssqlConnectionError::AuthenticationFailed(msg) => {
                SqlmonError::Connection(format!("Authentication failed: {}", msg))
            }
            other => SqlmonError::Driver(other.to_string()),
        }
    }
}

/// SQL Server connection using tiberius
///
/// Statements without parameters are sent as plain batches so that
/// session-scoped settings such as `USE` and `SET SHOWPLAN_XML` stick to
/// the connection. Parameterised statements go through `sp_executesql`.
pub struct MssqlConnection {
    client: Mutex<Client<Compat<TcpStream>>>,
    closed: AtomicBool,
    database: Option<String>,
    query_timeout: Option<Duration>,
}

impl MssqlConnection {
    /// Create a new SQL Server connection
    ///
    /// # Arguments
    /// * `host` - Server hostname
    /// * `port` - Server port (default 1433)
    /// * `database` - Initial database (optional)
    /// * `username` - Username (None for Windows auth)
    /// * `password` - Password
    /// * `trust_cert` - Whether to trust the server certificate
    #[tracing::instrument(skip(password))]
    pub async fn connect(
        host: &str,
        port: u16,
        database: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
        trust_cert: bool,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        tracing::debug!("connecting to SQL Server at {}:{}", host, port);

        let mut config = Config::new();
        config.host(host);
        config.port(port);
        config.application_name("sqlmon");

        if let Some(db) = database {
            config.database(db);
        }

        if trust_cert {
            config.trust_cert();
        }

        config.encryption(EncryptionLevel::Required);

        match (username, password) {
            (Some(user), Some(pass)) => {
                config.authentication(AuthMethod::sql_server(user, pass));
            }
            (Some(user), None) => {
                config.authentication(AuthMethod::sql_server(user, ""));
            }
            (None, _) => {
                #[cfg(windows)]
                {
                    config.authentication(AuthMethod::Integrated);
                }
                #[cfg(not(windows))]
                {
                    return Err(MssqlConnectionError::AuthenticationFailed(
                        "Windows authentication is only supported on Windows".to_string(),
                    ));
                }
            }
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tcp.set_nodelay(true)?;
        let compat_stream = tcp.compat_write();

        let client = Client::connect(config, compat_stream)
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tracing::debug!("successfully connected to SQL Server");

        Ok(Self {
            client: Mutex::new(client),
            closed: AtomicBool::new(false),
            database: database.map(String::from),
            query_timeout: None,
        })
    }

    /// Create a connection from config with standard keys
    ///
    /// Recognised params: `trust_cert` and `query_timeout_secs`.
    pub async fn from_config(
        config: &ConnectionConfig,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        let host = config
            .get_string("host")
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        let database = config.get_string("database");
        let username = config.get_string("user");
        let password = config.get_string("password");
        let trust_cert = config.get_bool("trust_cert").unwrap_or(false);
        let query_timeout = config
            .get_string("query_timeout_secs")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let connection = Self::connect(
            &host,
            config.get_port(),
            database.as_deref(),
            username.as_deref(),
            password.as_deref(),
            trust_cert,
        )
        .await?;

        Ok(match query_timeout {
            Some(limit) => connection.with_query_timeout(limit),
            None => connection,
        })
    }

    /// Bound every statement on this connection by `limit`
    ///
    /// A statement that runs past the limit leaves the TDS stream in an
    /// unknown state, so the connection is marked closed afterwards.
    pub fn with_query_timeout(mut self, limit: Duration) -> Self {
        self.query_timeout = Some(limit);
        self
    }

    /// Database the connection was opened against
    pub fn initial_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn ensure_not_closed(&self) -> std::result::Result<(), MssqlConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MssqlConnectionError::ConnectionClosed);
        }
        Ok(())
    }

    async fn bounded<T, F>(&self, fut: F) -> std::result::Result<T, MssqlConnectionError>
    where
        F: Future<Output = std::result::Result<T, tiberius::error::Error>>,
    {
        match self.query_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(outcome) => outcome.map_err(MssqlConnectionError::from),
                Err(_) => {
                    tracing::warn!(timeout = ?limit, "statement timed out, closing connection");
                    self.closed.store(true, Ordering::SeqCst);
                    Err(MssqlConnectionError::Timeout(limit))
                }
            },
            None => fut.await.map_err(MssqlConnectionError::from),
        }
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.ensure_not_closed()?;
        let start = Instant::now();

        let mut client = self.client.lock().await;

        let result = if params.is_empty() {
            self.bounded(async {
                client.simple_query(sql).await?.into_results().await?;
                Ok::<_, tiberius::error::Error>(0u64)
            })
            .await
        } else {
            let tiberius_params = values_to_tiberius_params(params);
            let param_refs: Vec<&dyn tiberius::ToSql> = tiberius_params
                .iter()
                .map(|p| p as &dyn tiberius::ToSql)
                .collect();
            self.bounded(async {
                let exec_result = client.execute(sql, &param_refs[..]).await?;
                Ok::<_, tiberius::error::Error>(exec_result.rows_affected().iter().sum::<u64>())
            })
            .await
        };

        match result {
            Ok(affected_rows) => {
                tracing::debug!(
                    affected_rows = affected_rows,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "execute completed"
                );
                Ok(StatementResult { affected_rows })
            }
            Err(e) => {
                tracing::error!(error = %e, "execute failed");
                Err(e.into())
            }
        }
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_not_closed()?;
        let start = Instant::now();

        let mut client = self.client.lock().await;

        let tib_rows = if params.is_empty() {
            self.bounded(async { client.simple_query(sql).await?.into_first_result().await })
                .await
        } else {
            let tiberius_params = values_to_tiberius_params(params);
            let param_refs: Vec<&dyn tiberius::ToSql> = tiberius_params
                .iter()
                .map(|p| p as &dyn tiberius::ToSql)
                .collect();
            self.bounded(async {
                client
                    .query(sql, &param_refs[..])
                    .await?
                    .into_first_result()
                    .await
            })
            .await
        };

        let tib_rows = match tib_rows {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "query failed");
                return Err(e.into());
            }
        };

        let columns: Vec<ColumnMeta> = tib_rows
            .first()
            .map(|first_row| {
                first_row
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| tiberius_column_to_meta(col, idx))
                    .collect()
            })
            .unwrap_or_default();

        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let mut rows: Vec<Row> = Vec::with_capacity(tib_rows.len());
        for tib_row in tib_rows {
            let values = tiberius_row_to_values(tib_row)?;
            rows.push(Row::new(column_names.clone(), values));
        }

        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            duration_ms = execution_time_ms,
            "query completed"
        );

        Ok(QueryResult {
            id: Uuid::new_v4(),
            columns,
            rows,
            affected_rows: 0,
            execution_time_ms,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("SQL Server connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Convert a tiberius column to ColumnMeta
fn tiberius_column_to_meta(col: &tiberius::Column, ordinal: usize) -> ColumnMeta {
    ColumnMeta {
        name: col.name().to_string(),
        data_type: format!("{:?}", col.column_type()),
        nullable: true,
        ordinal,
    }
}

/// Convert a tiberius row to a vector of Values by consuming the row
fn tiberius_row_to_values(row: TiberiusRow) -> Result<Vec<Value>> {
    row.into_iter().map(column_data_to_value).collect()
}

/// `base_year`-01-01 plus `days`
fn date_from_days(base_year: i32, days: i64) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(base_year, 1, 1)
        .and_then(|base| base.checked_add_signed(chrono::Duration::days(days)))
        .ok_or_else(|| {
            MssqlConnectionError::TypeConversion(format!(
                "date out of range: {} days after {}-01-01",
                days, base_year
            ))
            .into()
        })
}

/// Time of day from a count of 10^-scale second increments
fn time_from_increments(increments: u64, scale: u8) -> NaiveTime {
    let nanos_total = increments as u128 * 10u128.pow(9u32.saturating_sub(scale as u32));
    let secs = (nanos_total / 1_000_000_000) as u32;
    let nanos = (nanos_total % 1_000_000_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos).unwrap_or_default()
}

/// Convert tiberius ColumnData to a sqlmon Value
pub(crate) fn column_data_to_value(col_data: ColumnData<'static>) -> Result<Value> {
    match col_data {
        ColumnData::Bit(None) => Ok(Value::Null),
        ColumnData::Bit(Some(v)) => Ok(Value::Bool(v)),
        ColumnData::U8(None) => Ok(Value::Null),
        ColumnData::U8(Some(v)) => Ok(Value::Int32(v as i32)),
        ColumnData::I16(None) => Ok(Value::Null),
        ColumnData::I16(Some(v)) => Ok(Value::Int16(v)),
        ColumnData::I32(None) => Ok(Value::Null),
        ColumnData::I32(Some(v)) => Ok(Value::Int32(v)),
        ColumnData::I64(None) => Ok(Value::Null),
        ColumnData::I64(Some(v)) => Ok(Value::Int64(v)),
        ColumnData::F32(None) => Ok(Value::Null),
        ColumnData::F32(Some(v)) => Ok(Value::Float32(v)),
        ColumnData::F64(None) => Ok(Value::Null),
        ColumnData::F64(Some(v)) => Ok(Value::Float64(v)),
        ColumnData::String(None) => Ok(Value::Null),
        ColumnData::String(Some(v)) => Ok(Value::String(v.into_owned())),
        ColumnData::Guid(None) => Ok(Value::Null),
        ColumnData::Guid(Some(v)) => Ok(Value::Uuid(v)),
        ColumnData::Binary(None) => Ok(Value::Null),
        ColumnData::Binary(Some(v)) => Ok(Value::Bytes(v.into_owned())),
        ColumnData::Numeric(None) => Ok(Value::Null),
        ColumnData::Numeric(Some(v)) => Ok(Value::Decimal(v.to_string())),
        ColumnData::DateTime(None) => Ok(Value::Null),
        ColumnData::DateTime(Some(v)) => {
            // Fragments are 1/300 of a second.
            let fragments = v.seconds_fragments() as u64;
            let time = NaiveTime::from_num_seconds_from_midnight_opt(
                (fragments / 300) as u32,
                ((fragments % 300) * 1_000_000_000 / 300) as u32,
            )
            .unwrap_or_default();
            let date = date_from_days(1900, v.days() as i64)?;
            Ok(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        ColumnData::SmallDateTime(None) => Ok(Value::Null),
        ColumnData::SmallDateTime(Some(v)) => {
            let time =
                NaiveTime::from_num_seconds_from_midnight_opt(v.seconds_fragments() as u32 * 60, 0)
                    .unwrap_or_default();
            let date = date_from_days(1900, v.days() as i64)?;
            Ok(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        ColumnData::DateTime2(None) => Ok(Value::Null),
        ColumnData::DateTime2(Some(v)) => {
            let date = date_from_days(1, v.date().days() as i64)?;
            let time = time_from_increments(v.time().increments(), v.time().scale());
            Ok(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        ColumnData::DateTimeOffset(None) => Ok(Value::Null),
        ColumnData::DateTimeOffset(Some(v)) => {
            let dt2 = v.datetime2();
            let date = date_from_days(1, dt2.date().days() as i64)?;
            let time = time_from_increments(dt2.time().increments(), dt2.time().scale());
            let utc = chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(
                NaiveDateTime::new(date, time),
                chrono::Utc,
            );
            Ok(Value::DateTimeUtc(utc))
        }
        ColumnData::Date(None) => Ok(Value::Null),
        ColumnData::Date(Some(v)) => Ok(Value::Date(date_from_days(1, v.days() as i64)?)),
        ColumnData::Time(None) => Ok(Value::Null),
        ColumnData::Time(Some(v)) => Ok(Value::Time(time_from_increments(
            v.increments(),
            v.scale(),
        ))),
        ColumnData::Xml(None) => Ok(Value::Null),
        ColumnData::Xml(Some(v)) => Ok(Value::String(v.into_owned().into_string())),
    }
}

/// Container for tiberius parameter values
#[derive(Debug)]
pub(crate) enum TiberiusParam {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
}

impl tiberius::ToSql for TiberiusParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            TiberiusParam::Null => ColumnData::I32(None),
            TiberiusParam::Bool(v) => ColumnData::Bit(Some(*v)),
            TiberiusParam::I16(v) => ColumnData::I16(Some(*v)),
            TiberiusParam::I32(v) => ColumnData::I32(Some(*v)),
            TiberiusParam::I64(v) => ColumnData::I64(Some(*v)),
            TiberiusParam::F32(v) => ColumnData::F32(Some(*v)),
            TiberiusParam::F64(v) => ColumnData::F64(Some(*v)),
            TiberiusParam::String(v) => {
                ColumnData::String(Some(std::borrow::Cow::Borrowed(v.as_str())))
            }
            TiberiusParam::Bytes(v) => {
                ColumnData::Binary(Some(std::borrow::Cow::Borrowed(v.as_slice())))
            }
            TiberiusParam::Uuid(v) => ColumnData::Guid(Some(*v)),
        }
    }
}

/// Convert sqlmon Values to tiberius parameters
pub(crate) fn values_to_tiberius_params(values: &[Value]) -> Vec<TiberiusParam> {
    values
        .iter()
        .map(|v| match v {
            Value::Null => TiberiusParam::Null,
            Value::Bool(b) => TiberiusParam::Bool(*b),
            Value::Int16(i) => TiberiusParam::I16(*i),
            Value::Int32(i) => TiberiusParam::I32(*i),
            Value::Int64(i) => TiberiusParam::I64(*i),
            Value::Float32(f) => TiberiusParam::F32(*f),
            Value::Float64(f) => TiberiusParam::F64(*f),
            Value::Decimal(d) => TiberiusParam::String(d.clone()),
            Value::String(s) => TiberiusParam::String(s.clone()),
            Value::Bytes(b) => TiberiusParam::Bytes(b.clone()),
            Value::Uuid(u) => TiberiusParam::Uuid(*u),
            Value::Date(d) => TiberiusParam::String(d.to_string()),
            Value::Time(t) => TiberiusParam::String(t.to_string()),
            Value::DateTime(dt) => TiberiusParam::String(dt.to_string()),
            Value::DateTimeUtc(dt) => TiberiusParam::String(dt.to_rfc3339()),
        })
        .collect()
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("database", &self.database)
            .field("query_timeout", &self.query_timeout)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
