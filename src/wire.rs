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
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::auth::StayAuthSource;
use crate::engine::{Engine, EngineError, now_ms};
use crate::model::*;
use crate::observability;
use crate::rules;
use crate::sql::{self, Command, SqlError};

/// Client metadata key holding the session token bound to a connection.
pub const TOKEN_KEY: &str = "staybook.token";

pub struct StayHandler {
    engine: Arc<Engine>,
    query_parser: Arc<StayQueryParser>,
}

impl StayHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(StayQueryParser),
        }
    }

    /// Parse, run and meter one statement.
    fn run<C: ClientInfo>(&self, client: &mut C, query: &str) -> PgWireResult<Response> {
        let started = Instant::now();
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let result = self.execute_command(client, cmd);
        observability::record_query(label, started.elapsed(), result.is_ok());
        if let Err(e) = &result {
            debug!(command = label, "query failed: {e}");
        }
        result
    }

    fn execute_command<C: ClientInfo>(&self, client: &mut C, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        let now = now_ms();
        let cred = credential(client);

        match cmd {
            Command::Register {
                name,
                tel_number,
                email,
                password,
            } => {
                let auth = engine
                    .register(&name, &tel_number, &email, &password, now)
                    .map_err(engine_err)?;
                bind_token(client, auth.token);
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::Login { email, password } => {
                let auth = engine.login(&email, &password, now).map_err(|e| {
                    if e == EngineError::InvalidCredentials {
                        metrics::counter!(observability::AUTH_FAILURES_TOTAL, "stage" => "login")
                            .increment(1);
                    }
                    engine_err(e)
                })?;
                bind_token(client, auth.token.clone());
                rows(login_schema(), vec![auth], encode_login)
            }
            Command::SetToken { token } => {
                let cred = Credential::new(token);
                engine.me(&cred, now).map_err(engine_err)?;
                bind_token(client, cred.token().to_string());
                Ok(Response::Execution(Tag::new("SET")))
            }
            Command::Logout => {
                engine.logout(&cred);
                client.metadata_mut().remove(TOKEN_KEY);
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectMe => {
                let user = engine.me(&cred, now).map_err(engine_err)?;
                rows(user_schema(), vec![user], encode_user)
            }
            Command::UpdateMe(patch) => {
                engine.update_me(&cred, &patch, now).map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::SelectUsers => {
                let users = engine.list_users(&cred, now).map_err(engine_err)?;
                rows(user_schema(), users, encode_user)
            }
            Command::SelectHotels { id, search } => {
                let hotels = match id {
                    Some(id) => vec![engine.get_hotel(id).map_err(engine_err)?],
                    None => engine.list_hotels(search.as_deref()),
                };
                rows(hotel_schema(), hotels, encode_hotel)
            }
            Command::InsertHotel { hotel, returning } => {
                let hotel = engine.create_hotel(&cred, hotel, now).map_err(engine_err)?;
                if returning {
                    rows(hotel_schema(), vec![hotel], encode_hotel)
                } else {
                    Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
                }
            }
            Command::UpdateHotel { id, patch } => {
                engine
                    .update_hotel(&cred, id, &patch, now)
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteHotel { id } => {
                engine.delete_hotel(&cred, id, now).map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectBookings {
                id,
                hotel_id,
                status,
            } => {
                let bookings = match id {
                    Some(id) => vec![engine.get_booking(&cred, id, now).map_err(engine_err)?],
                    None => engine
                        .list_bookings(&cred, hotel_id, status, now)
                        .map_err(engine_err)?,
                };
                rows(booking_schema(), bookings, encode_booking)
            }
            Command::InsertBooking {
                hotel_id,
                start,
                end,
                returning,
            } => {
                let booking = engine
                    .create_booking(&cred, hotel_id, BookingWindow::new(start, end), now)
                    .map_err(engine_err)?;
                if returning {
                    rows(booking_schema(), vec![booking], encode_booking)
                } else {
                    Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
                }
            }
            Command::UpdateBooking { id, start, end } => {
                engine
                    .update_booking(&cred, id, start, end, now)
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteBooking { id } => {
                engine.cancel_booking(&cred, id, now).map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectCheckoutDates { start } => {
                let dates = engine.checkout_dates(start, now);
                rows(checkout_schema(), dates, |enc, date| {
                    enc.encode_field(&date.format("%Y-%m-%d").to_string())?;
                    enc.encode_field(&rules::day_start(*date))
                })
            }
        }
    }
}

fn credential<C: ClientInfo>(client: &C) -> Credential {
    Credential::new(client.metadata().get(TOKEN_KEY).cloned().unwrap_or_default())
}

fn bind_token<C: ClientInfo>(client: &mut C, token: String) {
    client.metadata_mut().insert(TOKEN_KEY.to_string(), token);
}

// ── Result sets ──────────────────────────────────────────────────

fn rows<T>(
    schema: Vec<FieldInfo>,
    items: Vec<T>,
    encode: impl Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> PgWireResult<Response> {
    let schema = Arc::new(schema);
    let rows: Vec<PgWireResult<_>> = items
        .iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn login_schema() -> Vec<FieldInfo> {
    vec![
        field("token", Type::VARCHAR),
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("email", Type::VARCHAR),
        field("role", Type::VARCHAR),
    ]
}

fn user_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("tel_number", Type::VARCHAR),
        field("email", Type::VARCHAR),
        field("role", Type::VARCHAR),
    ]
}

fn hotel_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("address", Type::VARCHAR),
        field("tel", Type::VARCHAR),
        field("image", Type::VARCHAR),
    ]
}

fn booking_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("hotel_id", Type::VARCHAR),
        field("hotel_name", Type::VARCHAR),
        field("user_id", Type::VARCHAR),
        field("user_name", Type::VARCHAR),
        field("start_date", Type::INT8),
        field("end_date", Type::INT8),
        field("created_at", Type::INT8),
        field("status", Type::VARCHAR),
        field("nights", Type::INT8),
        field("days_until_stay", Type::INT8),
        field("can_modify", Type::BOOL),
        field("can_cancel", Type::BOOL),
    ]
}

fn checkout_schema() -> Vec<FieldInfo> {
    vec![field("end_date", Type::VARCHAR), field("end_ms", Type::INT8)]
}

fn encode_login(enc: &mut DataRowEncoder, auth: &AuthInfo) -> PgWireResult<()> {
    enc.encode_field(&auth.token)?;
    enc.encode_field(&auth.user.id.to_string())?;
    enc.encode_field(&auth.user.name)?;
    enc.encode_field(&auth.user.email)?;
    enc.encode_field(&auth.user.role.as_str().to_string())
}

fn encode_user(enc: &mut DataRowEncoder, user: &User) -> PgWireResult<()> {
    enc.encode_field(&user.id.to_string())?;
    enc.encode_field(&user.name)?;
    enc.encode_field(&user.tel_number)?;
    enc.encode_field(&user.email)?;
    enc.encode_field(&user.role.as_str().to_string())
}

fn encode_hotel(enc: &mut DataRowEncoder, hotel: &Hotel) -> PgWireResult<()> {
    let address = serde_json::to_string(&hotel.address)
        .map_err(|e| PgWireError::ApiError(Box::new(e)))?;
    enc.encode_field(&hotel.id.to_string())?;
    enc.encode_field(&hotel.name)?;
    enc.encode_field(&address)?;
    enc.encode_field(&hotel.tel)?;
    enc.encode_field(&hotel.image)
}

fn encode_booking(enc: &mut DataRowEncoder, b: &BookingInfo) -> PgWireResult<()> {
    enc.encode_field(&b.id.to_string())?;
    enc.encode_field(&b.hotel_id.to_string())?;
    enc.encode_field(&b.hotel_name)?;
    enc.encode_field(&b.user_id.to_string())?;
    enc.encode_field(&b.user_name)?;
    enc.encode_field(&b.start)?;
    enc.encode_field(&b.end)?;
    enc.encode_field(&b.created_at)?;
    enc.encode_field(&b.status.as_str().to_string())?;
    enc.encode_field(&b.nights)?;
    enc.encode_field(&b.days_until_stay)?;
    enc.encode_field(&b.can_modify)?;
    enc.encode_field(&b.can_cancel)
}

/// Row shape a statement will produce, guessed from its text so Describe
/// can answer before parameters are bound.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.trim_start().to_ascii_uppercase();
    let selects = upper.starts_with("SELECT");
    if !selects && !upper.contains("RETURNING") {
        return vec![];
    }
    let mut words = upper.split(|c: char| c.is_whitespace() || c == '(' || c == ';');
    let table = words
        .by_ref()
        .find(|w| matches!(*w, "FROM" | "INTO"))
        .and_then(|_| words.find(|w| !w.is_empty()));
    match table {
        Some("LOGIN") if selects => login_schema(),
        Some("ME" | "USERS") if selects => user_schema(),
        Some("HOTELS") => hotel_schema(),
        Some("BOOKINGS") => booking_schema(),
        Some("CHECKOUT_DATES") if selects => checkout_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for StayHandler {
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
        Ok(vec![self.run(client, query)?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct StayQueryParser;

#[async_trait]
impl QueryParser for StayQueryParser {
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
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for StayHandler {
    type Statement = String;
    type QueryParser = StayQueryParser;

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
        self.run(client, &sql)
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
            result_schema(&target.statement),
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
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest $N placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
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

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    bind_params(&portal.statement.statement, &portal.parameters)
}

/// Single left-to-right pass: bound values are emitted once and never rescanned.
/// Placeholders inside quoted literals and unbound indexes are copied verbatim.
fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                in_literal = !in_literal;
                i += 1;
            }
            b'$' if !in_literal => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                let bound = sql[start..end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| params.get(idx));
                if let Some(param) = bound {
                    out.push_str(&sql[copied..i]);
                    match param {
                        Some(value) => {
                            let text = String::from_utf8_lossy(value.as_ref());
                            out.push('\'');
                            out.push_str(&text.replace('\'', "''"));
                            out.push('\'');
                        }
                        None => out.push_str("NULL"),
                    }
                    copied = end;
                }
                i = end.max(i + 1);
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct StayFactory {
    handler: Arc<StayHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<StayAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl StayFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = StayAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(StayHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for StayFactory {
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

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(StayFactory::new(engine, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn engine_sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Unauthenticated | EngineError::InvalidCredentials => "28000",
        EngineError::Forbidden(_) => "42501",
        EngineError::Invalid(_) | EngineError::InvalidInput(_) => "22023",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::NotFound(_) => "P0002",
        EngineError::NotModifiable(_)
        | EngineError::NotCancellable(_)
        | EngineError::NoChanges
        | EngineError::HasBookings(_)
        | EngineError::LimitExceeded(_) => "P0001",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    if let EngineError::LimitExceeded(what) = &e {
        warn!("limit exceeded: {what}");
    }
    user_error(engine_sqlstate(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}
