use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::StartupHandler;
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat,
    FieldInfo, QueryResponse, Response,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::engine::{now_ms, Engine};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command};
use crate::venue::VenueManager;

pub struct BookdHandler {
    venues: Arc<VenueManager>,
    query_parser: Arc<BookdQueryParser>,
}

impl BookdHandler {
    pub fn new(venues: Arc<VenueManager>) -> Self {
        Self {
            venues,
            query_parser: Arc::new(BookdQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.venues.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("venue error: {e}"),
            )))
        })
    }

    /// Parse, execute and record RED metrics for one statement.
    async fn run<C: ClientInfo>(&self, client: &C, query: &str) -> PgWireResult<Response> {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(|e| {
            metrics::counter!(QUERIES_TOTAL, "command" => "unparsed", "status" => "error")
                .increment(1);
            sql_err(e)
        })?;

        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(&engine, cmd).await;
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        result
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Response> {
        match cmd {
            Command::InsertBooking(intake) => {
                let booking = engine.submit(intake).await.map_err(engine_err)?;
                booking_response(vec![booking])
            }
            Command::SelectBookings { status, id } => {
                let bookings = match (id, status) {
                    (Some(id), _) => engine
                        .get_booking(id)
                        .await
                        .into_iter()
                        .filter(|b| status.is_none_or(|s| b.status == s))
                        .collect(),
                    (None, Some(status)) => engine.list_by_status(status).await,
                    (None, None) => engine.list_all().await,
                };
                booking_response(bookings)
            }
            Command::Finalize => {
                let report = engine.finalize(now_ms()).await.map_err(engine_err)?;
                let schema = Arc::new(finalize_schema());
                let rows: Vec<PgWireResult<_>> = report
                    .promoted
                    .iter()
                    .map(|id| (id, "promoted"))
                    .chain(report.blocked.iter().map(|id| (id, "blocked")))
                    .map(|(id, outcome)| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&id.to_string())?;
                        encoder.encode_field(&outcome.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectStaffing {
                min_staff,
                start,
                end,
            } => {
                let window = staffing_window(engine, start, end).map_err(engine_err)?;
                let scheduled = engine.scheduled_staff(window).await;
                let schema = Arc::new(staffing_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&(scheduled >= min_staff))?;
                encoder.encode_field(&(scheduled as i64))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::InsertEmployee { name } => {
                let employee = engine.create_employee(name).await.map_err(engine_err)?;
                employee_response(vec![employee])
            }
            Command::SelectEmployees => employee_response(engine.list_employees().await),
            Command::InsertShift {
                employee_id,
                start,
                end,
            } => {
                let shift = engine
                    .create_shift(employee_id, start, end)
                    .await
                    .map_err(engine_err)?;
                shift_response(vec![shift])
            }
            Command::SelectShifts => shift_response(engine.list_shifts().await),
            Command::SetStandby {
                employee_id,
                standby,
            } => {
                let employee = engine
                    .set_standby(employee_id, standby)
                    .await
                    .map_err(engine_err)?;
                employee_response(vec![employee])
            }
        }
    }
}

/// Explicit bounds win; a missing bound falls back to `[now, now + legacy_slot)`.
fn staffing_window(
    engine: &Engine,
    start: Option<Ms>,
    end: Option<Ms>,
) -> Result<Span, crate::engine::EngineError> {
    let now = now_ms();
    let start = start.unwrap_or(now);
    let end = match end {
        Some(end) => end,
        None => start
            .checked_add(engine.config().legacy_slot)
            .ok_or(crate::engine::EngineError::LimitExceeded("timestamp out of range"))?,
    };
    crate::engine::validate_span(start, end)
}

// ── Row schemas ──────────────────────────────────────────────────

fn text(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int8(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn boolean(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::BOOL, FieldFormat::Text)
}

fn booking_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("customer_name"),
        int8("start"),
        int8("end"),
        int8("party_size"),
        text("status"),
        text("contact"),
        text("notes"),
        int8("created_at"),
        int8("provisional_expires_at"),
    ]
}

fn employee_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("name"), boolean("standby")]
}

fn shift_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("employee_id"), int8("start"), int8("end")]
}

fn staffing_schema() -> Vec<FieldInfo> {
    vec![boolean("staffed"), int8("scheduled")]
}

fn finalize_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("outcome")]
}

fn booking_response(bookings: Vec<Booking>) -> PgWireResult<Response> {
    let schema = Arc::new(booking_schema());
    let rows: Vec<PgWireResult<_>> = bookings
        .into_iter()
        .map(|b| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&b.id.to_string())?;
            encoder.encode_field(&b.customer_name)?;
            encoder.encode_field(&b.span.start)?;
            encoder.encode_field(&b.span.end)?;
            encoder.encode_field(&i64::from(b.party_size))?;
            encoder.encode_field(&b.status.to_string())?;
            encoder.encode_field(&b.contact)?;
            encoder.encode_field(&b.notes)?;
            encoder.encode_field(&b.created_at)?;
            encoder.encode_field(&b.provisional_expires_at)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn employee_response(employees: Vec<Employee>) -> PgWireResult<Response> {
    let schema = Arc::new(employee_schema());
    let rows: Vec<PgWireResult<_>> = employees
        .into_iter()
        .map(|e| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&e.id.to_string())?;
            encoder.encode_field(&e.name)?;
            encoder.encode_field(&e.standby)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn shift_response(shifts: Vec<Shift>) -> PgWireResult<Response> {
    let schema = Arc::new(shift_schema());
    let rows: Vec<PgWireResult<_>> = shifts
        .into_iter()
        .map(|s| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&s.id.to_string())?;
            encoder.encode_field(&s.employee_id.to_string())?;
            encoder.encode_field(&s.span.start)?;
            encoder.encode_field(&s.span.end)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

/// Result columns for a statement, judged from its target table.
fn schema_for(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|w| !w.is_empty())
        .collect();
    let table = words
        .windows(2)
        .find(|w| w[0] == "INTO" || w[0] == "FROM")
        .map(|w| w[1].trim_matches('"'));
    match table {
        Some("BOOKINGS") => booking_schema(),
        Some("EMPLOYEES") | Some("STANDBY") => employee_schema(),
        Some("SHIFTS") => shift_schema(),
        Some("STAFFING") => staffing_schema(),
        Some("FINALIZE") => finalize_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for BookdHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(client, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct BookdQueryParser;

#[async_trait]
impl QueryParser for BookdQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for BookdHandler {
    type Statement = String;
    type QueryParser = BookdQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        self.run(client, &sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema_for(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Replace `$1, $2, ...` with bound text-format values, highest index first so `$1` never eats `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut sql = portal.statement.statement.clone();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        sql = sql.replace(&format!("${}", i + 1), &value);
    }
    sql
}

// ── Factory ──────────────────────────────────────────────────────

pub struct BookdFactory {
    handler: Arc<BookdHandler>,
    noop: Arc<NoopHandler>,
}

impl BookdFactory {
    pub fn new(venues: Arc<VenueManager>) -> Self {
        Self {
            handler: Arc::new(BookdHandler::new(venues)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for BookdFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.noop.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client socket until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    venues: Arc<VenueManager>,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(BookdFactory::new(venues));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: crate::engine::EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
