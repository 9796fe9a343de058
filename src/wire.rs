use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::data::DataRow;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::VenueAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{QUERIES_TOTAL, QUERY_DURATION_SECONDS, command_label};
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct VenueHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<VenueQueryParser>,
}

impl VenueHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(VenueQueryParser),
        }
    }

    /// The venue is the database named at startup.
    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// Run one command, recording its outcome and latency.
    async fn run(
        &self,
        engine: &Engine,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Vec<Response>> {
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertBooking {
                id,
                service,
                date,
                slot_label,
                tier_or_package,
                label,
            } => {
                let candidate = CandidateRequest {
                    id,
                    service,
                    date,
                    slot_label,
                    tier_or_package,
                    label,
                };
                engine.reserve_or_reject(candidate).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateBookingStatus { id, status } => {
                engine.update_status(id, status).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteBooking { id } => {
                engine.cancel_booking(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectBookings { service, date } => {
                let bookings = engine.bookings_on(service, date).await;
                let schema = Arc::new(bookings_schema(format));
                let rows: Vec<PgWireResult<DataRow>> = bookings
                    .iter()
                    .map(|b| -> PgWireResult<DataRow> {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&b.id.to_string())?;
                        encoder.encode_field(&b.service.to_string())?;
                        encoder.encode_field(&b.date.format(DATE_FORMAT).to_string())?;
                        encoder.encode_field(&b.slot_label)?;
                        encoder.encode_field(&b.tier_or_package)?;
                        encoder.encode_field(&b.label)?;
                        encoder.encode_field(&b.status.to_string())?;
                        encoder.encode_field(&b.created_at)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectUnavailableSlots { service, date } => {
                let slots = engine
                    .unavailable_slots(service, date)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(unavailable_slots_schema(format));
                let rows: Vec<PgWireResult<DataRow>> = slots
                    .iter()
                    .map(|slot| -> PgWireResult<DataRow> {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(slot)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectSlots { service, date } => {
                let grid = engine.slot_grid(service, date).await.map_err(engine_err)?;
                let schema = Arc::new(slots_schema(format));
                let rows: Vec<PgWireResult<DataRow>> = grid
                    .iter()
                    .map(|slot| -> PgWireResult<DataRow> {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&slot.slot_label)?;
                        encoder.encode_field(&slot.window.start)?;
                        encoder.encode_field(&slot.window.end)?;
                        encoder.encode_field(&slot.available)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectAvailability {
                service,
                date,
                slot_label,
                length,
            } => {
                let available = engine
                    .check_slot(service, date, &slot_label, &length)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(availability_schema(format));
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&service.to_string())?;
                encoder.encode_field(&date.format(DATE_FORMAT).to_string())?;
                encoder.encode_field(&slot_label)?;
                encoder.encode_field(&available)?;
                Ok(vec![query_response(schema, vec![Ok(encoder.take_row())])])
            }
            Command::SelectFullyBookedDates { service, from, to } => {
                let dates = engine
                    .fully_booked_dates(service, from, to)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(fully_booked_dates_schema(format));
                let rows: Vec<PgWireResult<DataRow>> = dates
                    .iter()
                    .map(|date| -> PgWireResult<DataRow> {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&date.format(DATE_FORMAT).to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
        }
    }
}

fn query_response(schema: Arc<Vec<FieldInfo>>, rows: Vec<PgWireResult<DataRow>>) -> Response {
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

// ── Result schemas ───────────────────────────────────────────────

fn fields(columns: &[(&str, Type)], format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, (name, ty))| {
            FieldInfo::new(name.to_string(), None, None, ty.clone(), format.format_for(idx))
        })
        .collect()
}

fn bookings_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("id", Type::VARCHAR),
            ("service", Type::VARCHAR),
            ("date", Type::VARCHAR),
            ("slot", Type::VARCHAR),
            ("tier", Type::VARCHAR),
            ("label", Type::VARCHAR),
            ("status", Type::VARCHAR),
            ("created_at", Type::INT8),
        ],
        format,
    )
}

fn unavailable_slots_schema(format: &Format) -> Vec<FieldInfo> {
    fields(&[("slot", Type::VARCHAR)], format)
}

fn slots_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("slot", Type::VARCHAR),
            ("start", Type::INT8),
            ("end", Type::INT8),
            ("available", Type::BOOL),
        ],
        format,
    )
}

fn availability_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("service", Type::VARCHAR),
            ("date", Type::VARCHAR),
            ("slot", Type::VARCHAR),
            ("available", Type::BOOL),
        ],
        format,
    )
}

fn fully_booked_dates_schema(format: &Format) -> Vec<FieldInfo> {
    fields(&[("date", Type::VARCHAR)], format)
}

/// Result columns for a statement, chosen by the table it selects from.
fn describe_schema(sql: &str, format: &Format) -> Vec<FieldInfo> {
    match sql::select_table(sql).as_deref() {
        Some("bookings") => bookings_schema(format),
        Some("unavailable_slots") => unavailable_slots_schema(format),
        Some("slots") => slots_schema(format),
        Some("availability") => availability_schema(format),
        Some("fully_booked_dates") => fully_booked_dates_schema(format),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for VenueHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.run(&engine, cmd, &Format::UnifiedText).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct VenueQueryParser;

#[async_trait]
impl QueryParser for VenueQueryParser {
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
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(describe_schema(
            stmt,
            column_format.unwrap_or(&Format::UnifiedText),
        ))
    }
}

#[async_trait]
impl ExtendedQueryHandler for VenueHandler {
    type Statement = String;
    type QueryParser = VenueQueryParser;

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
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let responses = self
            .run(&engine, cmd, &portal.result_column_format)
            .await?;
        responses
            .into_iter()
            .next()
            .ok_or_else(|| PgWireError::ApiError("command produced no response".into()))
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
            describe_schema(&target.statement, &Format::UnifiedText),
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
        Ok(DescribePortalResponse::new(describe_schema(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    max = max.max(n);
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... with bound text parameters, quoted as literals.
fn substitute_params(portal: &Portal<String>) -> String {
    substitute(&portal.statement.statement, &portal.parameters)
}

/// One pass over the statement text; bound values are never rescanned.
/// Placeholders past the bound parameters are left as written.
fn substitute<P: AsRef<[u8]>>(sql: &str, params: &[Option<P>]) -> String {
    let bytes = sql.as_bytes();
    let mut result = String::with_capacity(sql.len());
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        let param = sql[start..end]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| params.get(idx));
        if let Some(param) = param {
            result.push_str(&sql[copied..i]);
            match param {
                Some(value) => {
                    let text = String::from_utf8_lossy(value.as_ref());
                    result.push('\'');
                    result.push_str(&text.replace('\'', "''"));
                    result.push('\'');
                }
                None => result.push_str("NULL"),
            }
            copied = end;
        }
        i = end;
    }
    result.push_str(&sql[copied..]);
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct VenueFactory {
    handler: Arc<VenueHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<VenueAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl VenueFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = VenueAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(VenueHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for VenueFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client socket until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(VenueFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

/// SQLSTATE for an engine failure. A lost race is an exclusion violation so
/// clients can tell it apart from bad input.
fn engine_sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::SlotNoLongerAvailable { .. } => "23P01",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::InvalidSlotLabel(_) => "22007",
        EngineError::NotFound(_) => "P0002",
        EngineError::InvalidTransition { .. }
        | EngineError::LimitExceeded(_)
        | EngineError::WalError(_) => "P0001",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(engine_sqlstate(&e), e.to_string())
}

fn sql_sqlstate(e: &SqlError) -> &'static str {
    match e {
        SqlError::InvalidDate(_) => "22007",
        _ => "42601",
    }
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error(sql_sqlstate(&e), e.to_string())
}
