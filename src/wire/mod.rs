//! PostgreSQL-dialect server loop. One task per connection: negotiate TLS,
//! authenticate, resolve the merchant engine from the database name, then
//! serve queries and slot-change NOTIFYs over the same stream.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::engine::{now_ms, Engine, EngineError};
use crate::merchant::MerchantManager;
use crate::model::{fmt_minute, Booking, BusinessDay, ReservationLock, SlotInfo, SlotView};
use crate::notify::{parse_day_channel, SlotChange};
use crate::observability::{
    command_label, AUTH_FAILURES_TOTAL, QUERIES_TOTAL, QUERY_DURATION_SECONDS,
};
use crate::sql::{parse_sql, Command, SqlError};

mod protocol;

use protocol::{
    BackendMessage, FrontendMessage, PgCodec, CANCEL_REQUEST, MAX_STARTUP_LEN, PROTOCOL_VERSION,
    SSL_REQUEST,
};

// ── Entry ────────────────────────────────────────────────────────

/// Serve one client connection to completion. The first frame decides the
/// stream: an SSLRequest upgrades to TLS when an acceptor is configured,
/// anything else must be a v3 startup packet.
pub async fn process_connection(
    mut socket: TcpStream,
    merchants: Arc<MerchantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let head = read_head(&mut socket).await?;
    if head == (8, SSL_REQUEST) {
        return match tls {
            Some(acceptor) => {
                socket.write_all(b"S").await?;
                let stream = acceptor.accept(socket).await?;
                run_session(stream, None, merchants, password).await
            }
            None => {
                socket.write_all(b"N").await?;
                run_session(socket, None, merchants, password).await
            }
        };
    }
    run_session(socket, Some(head), merchants, password).await
}

/// Startup frames carry no tag byte: 4 bytes of length then 4 of code.
async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<(usize, i32)> {
    let mut head = [0u8; 8];
    stream.read_exact(&mut head).await?;
    let len = i32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    let code = i32::from_be_bytes([head[4], head[5], head[6], head[7]]);
    if len < 8 || len as usize > MAX_STARTUP_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("startup length {len} out of range"),
        ));
    }
    Ok((len as usize, code))
}

async fn read_startup_params<S: AsyncRead + Unpin>(
    stream: &mut S,
    len: usize,
) -> io::Result<HashMap<String, String>> {
    let mut body = vec![0u8; len - 8];
    stream.read_exact(&mut body).await?;

    let mut params = HashMap::new();
    let mut rest = &body[..];
    loop {
        let Some(pos) = rest.iter().position(|&b| b == 0) else {
            break;
        };
        if pos == 0 {
            break; // terminator
        }
        let key = startup_str(&rest[..pos])?;
        rest = &rest[pos + 1..];
        let Some(vpos) = rest.iter().position(|&b| b == 0) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "startup parameter without value",
            ));
        };
        let value = startup_str(&rest[..vpos])?;
        rest = &rest[vpos + 1..];
        params.insert(key, value);
    }
    Ok(params)
}

fn startup_str(bytes: &[u8]) -> io::Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "startup parameter is not utf8"))
}

// ── Session ──────────────────────────────────────────────────────

async fn run_session<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    preread: Option<(usize, i32)>,
    merchants: Arc<MerchantManager>,
    password: String,
) -> io::Result<()> {
    let (len, code) = match preread {
        Some(head) => head,
        None => read_head(&mut stream).await?,
    };
    if code == CANCEL_REQUEST {
        // Cancel keys are not tracked; nothing to do.
        return Ok(());
    }
    if code != PROTOCOL_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported protocol code {code}"),
        ));
    }
    let params = read_startup_params(&mut stream, len).await?;
    let user = params.get("user").cloned().unwrap_or_default();
    let database = params
        .get("database")
        .or_else(|| params.get("user"))
        .cloned()
        .unwrap_or_else(|| "default".to_string());

    let mut framed = Framed::new(stream, PgCodec);

    framed.send(BackendMessage::AuthCleartextPassword).await?;
    let supplied = loop {
        match framed.next().await {
            Some(Ok(FrontendMessage::Password(p))) => break p,
            Some(Ok(FrontendMessage::Terminate)) | None => return Ok(()),
            Some(Ok(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "expected password message",
                ));
            }
            Some(Err(e)) => return Err(e),
        }
    };
    if supplied != password {
        metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
        warn!("authentication failure for user \"{user}\"");
        framed
            .send(BackendMessage::Error {
                code: "28P01",
                message: format!("password authentication failed for user \"{user}\""),
            })
            .await?;
        return Ok(());
    }

    framed.send(BackendMessage::AuthOk).await?;
    for (name, value) in [
        ("server_version", "16.3"),
        ("client_encoding", "UTF8"),
        ("integer_datetimes", "on"),
    ] {
        framed
            .send(BackendMessage::ParameterStatus { name, value })
            .await?;
    }
    framed
        .send(BackendMessage::BackendKeyData {
            pid: std::process::id(),
            secret: now_ms() as u32,
        })
        .await?;

    let engine = match merchants.get_or_create(&database) {
        Ok(engine) => engine,
        Err(e) => {
            framed
                .send(BackendMessage::Error {
                    code: "08006",
                    message: format!("cannot open merchant \"{database}\": {e}"),
                })
                .await?;
            return Ok(());
        }
    };
    framed.send(BackendMessage::ReadyForQuery).await?;
    debug!("session open: merchant={database} user={user}");

    // NOTIFY traffic funnels through one mpsc so the socket has a single
    // writer; per-channel forwarder tasks feed it.
    let (notif_tx, mut notif_rx) = mpsc::unbounded_channel();
    let mut listens: HashMap<String, JoinHandle<()>> = HashMap::new();

    let outcome = session_loop(
        &mut framed,
        &engine,
        &mut listens,
        &notif_tx,
        &mut notif_rx,
    )
    .await;

    for (_, fwd) in listens.drain() {
        fwd.abort();
    }
    debug!("session closed: merchant={database}");
    outcome
}

async fn session_loop<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut Framed<S, PgCodec>,
    engine: &Arc<Engine>,
    listens: &mut HashMap<String, JoinHandle<()>>,
    notif_tx: &mpsc::UnboundedSender<(String, String)>,
    notif_rx: &mut mpsc::UnboundedReceiver<(String, String)>,
) -> io::Result<()> {
    let mut statements: HashMap<String, String> = HashMap::new();
    let mut portals: HashMap<String, String> = HashMap::new();
    let mut failed_until_sync = false;

    loop {
        tokio::select! {
            frame = framed.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                match frame? {
                    FrontendMessage::Terminate => return Ok(()),
                    FrontendMessage::Sync => {
                        failed_until_sync = false;
                        framed.send(BackendMessage::ReadyForQuery).await?;
                    }
                    // After an extended-protocol error everything up to the
                    // next Sync is discarded.
                    _ if failed_until_sync => {}
                    FrontendMessage::Query(sql) => {
                        dispatch(framed, engine, listens, notif_tx, &sql, true).await?;
                        framed.send(BackendMessage::ReadyForQuery).await?;
                    }
                    FrontendMessage::Parse { name, query } => {
                        statements.insert(name, query);
                        framed.send(BackendMessage::ParseComplete).await?;
                    }
                    FrontendMessage::Bind { portal, statement, params } => {
                        let Some(sql) = statements.get(&statement) else {
                            failed_until_sync = true;
                            send_error(
                                framed,
                                "26000",
                                format!("prepared statement \"{statement}\" does not exist"),
                            )
                            .await?;
                            continue;
                        };
                        portals.insert(portal, substitute_params(sql, &params));
                        framed.send(BackendMessage::BindComplete).await?;
                    }
                    FrontendMessage::Describe { kind: b'S', name } => {
                        let Some(sql) = statements.get(&name) else {
                            failed_until_sync = true;
                            send_error(
                                framed,
                                "26000",
                                format!("prepared statement \"{name}\" does not exist"),
                            )
                            .await?;
                            continue;
                        };
                        framed
                            .send(BackendMessage::ParameterDescription {
                                count: count_params(sql),
                            })
                            .await?;
                        // A statement with placeholders does not parse until
                        // bind time, so its row shape is unknown here.
                        match parse_sql(sql).ok().and_then(|cmd| schema_for(&cmd)) {
                            Some(columns) => {
                                framed.send(BackendMessage::RowDescription { columns }).await?;
                            }
                            None => framed.send(BackendMessage::NoData).await?,
                        }
                    }
                    FrontendMessage::Describe { kind: b'P', name } => {
                        let Some(sql) = portals.get(&name) else {
                            failed_until_sync = true;
                            send_error(
                                framed,
                                "34000",
                                format!("portal \"{name}\" does not exist"),
                            )
                            .await?;
                            continue;
                        };
                        match parse_sql(sql).ok().and_then(|cmd| schema_for(&cmd)) {
                            Some(columns) => {
                                framed.send(BackendMessage::RowDescription { columns }).await?;
                            }
                            None => framed.send(BackendMessage::NoData).await?,
                        }
                    }
                    FrontendMessage::Describe { .. } => {
                        failed_until_sync = true;
                        send_error(framed, "08P01", "invalid describe target".to_string())
                            .await?;
                    }
                    FrontendMessage::Execute { portal } => {
                        let Some(sql) = portals.get(&portal).cloned() else {
                            failed_until_sync = true;
                            send_error(
                                framed,
                                "34000",
                                format!("portal \"{portal}\" does not exist"),
                            )
                            .await?;
                            continue;
                        };
                        // Describe already sent the row shape; Execute only
                        // streams rows and the tag.
                        let ok =
                            dispatch(framed, engine, listens, notif_tx, &sql, false).await?;
                        if !ok {
                            failed_until_sync = true;
                        }
                    }
                    FrontendMessage::Close { kind, name } => {
                        match kind {
                            b'S' => {
                                statements.remove(&name);
                            }
                            b'P' => {
                                portals.remove(&name);
                            }
                            _ => {}
                        }
                        framed.send(BackendMessage::CloseComplete).await?;
                    }
                    FrontendMessage::Flush => framed.flush().await?,
                    FrontendMessage::Password(_) => {
                        debug!("ignoring password message outside startup");
                    }
                }
            }
            Some((channel, payload)) = notif_rx.recv() => {
                framed
                    .send(BackendMessage::Notification {
                        pid: std::process::id(),
                        channel,
                        payload,
                    })
                    .await?;
            }
        }
    }
}

// ── Dispatch ─────────────────────────────────────────────────────

enum QueryError {
    Engine(EngineError),
    BadChannel(String),
}

impl From<EngineError> for QueryError {
    fn from(e: EngineError) -> Self {
        QueryError::Engine(e)
    }
}

struct Outcome {
    columns: Option<&'static [&'static str]>,
    rows: Vec<Vec<Option<String>>>,
    tag: String,
}

impl Outcome {
    fn done(tag: &str) -> Self {
        Self {
            columns: None,
            rows: Vec::new(),
            tag: tag.to_string(),
        }
    }

    fn rows(columns: &'static [&'static str], rows: Vec<Vec<Option<String>>>, tag: String) -> Self {
        Self {
            columns: Some(columns),
            rows,
            tag,
        }
    }
}

/// Parse and run one statement, writing rows, tag, or error to the stream.
/// Returns whether the statement succeeded.
async fn dispatch<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut Framed<S, PgCodec>,
    engine: &Arc<Engine>,
    listens: &mut HashMap<String, JoinHandle<()>>,
    notif_tx: &mpsc::UnboundedSender<(String, String)>,
    sql: &str,
    with_row_description: bool,
) -> io::Result<bool> {
    let cmd = match parse_sql(sql) {
        Ok(cmd) => cmd,
        Err(SqlError::Empty) => {
            framed.send(BackendMessage::EmptyQueryResponse).await?;
            return Ok(true);
        }
        Err(e) => {
            send_error(framed, "42601", e.to_string()).await?;
            return Ok(false);
        }
    };
    let label = command_label(&cmd);
    let started = Instant::now();

    let outcome = run_command(engine, listens, notif_tx, cmd).await;

    let status = if outcome.is_ok() { "ok" } else { "error" };
    metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
    metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
        .record(started.elapsed().as_secs_f64());

    match outcome {
        Ok(Outcome { columns, rows, tag }) => {
            if let Some(columns) = columns {
                if with_row_description {
                    framed
                        .send(BackendMessage::RowDescription { columns })
                        .await?;
                }
                for values in rows {
                    framed.send(BackendMessage::DataRow { values }).await?;
                }
            }
            framed.send(BackendMessage::CommandComplete { tag }).await?;
            Ok(true)
        }
        Err(e) => {
            let (code, message) = match e {
                QueryError::Engine(err) => ("P0001", err.to_string()),
                QueryError::BadChannel(msg) => ("42000", msg),
            };
            send_error(framed, code, message).await?;
            Ok(false)
        }
    }
}

async fn run_command(
    engine: &Arc<Engine>,
    listens: &mut HashMap<String, JoinHandle<()>>,
    notif_tx: &mpsc::UnboundedSender<(String, String)>,
    cmd: Command,
) -> Result<Outcome, QueryError> {
    match cmd {
        Command::InsertBusinessDay {
            date,
            open_min,
            close_min,
            holiday,
            returning,
        } => {
            let day = engine
                .set_business_day(date, open_min, close_min, holiday)
                .await?;
            Ok(insert_outcome(
                returning,
                BUSINESS_DAY_COLUMNS,
                business_day_row(&day),
            ))
        }
        Command::InsertStaffDay {
            staff_id,
            date,
            holiday,
        } => {
            engine.set_staff_day(staff_id, date, holiday).await?;
            Ok(Outcome::done("INSERT 0 1"))
        }
        Command::InsertBlock {
            staff_id,
            date,
            start,
        } => {
            engine.block_slot(staff_id, date, start).await?;
            Ok(Outcome::done("INSERT 0 1"))
        }
        Command::DeleteBlock {
            staff_id,
            date,
            start,
        } => {
            engine.unblock_slot(staff_id, date, start).await?;
            Ok(Outcome::done("DELETE 1"))
        }
        Command::InsertLock {
            id,
            staff_id,
            date,
            start,
            duration,
            session,
            returning,
        } => {
            let lock = engine
                .acquire_lock(id, staff_id, date, start, duration, &session)
                .await?;
            Ok(insert_outcome(returning, LOCK_COLUMNS, lock_row(&lock)))
        }
        Command::UpdateLock {
            id,
            extend_ms,
            returning,
        } => {
            let lock = engine.renew_lock(id, extend_ms).await?;
            if returning {
                Ok(Outcome::rows(
                    LOCK_COLUMNS,
                    vec![lock_row(&lock)],
                    "UPDATE 1".to_string(),
                ))
            } else {
                Ok(Outcome::done("UPDATE 1"))
            }
        }
        Command::DeleteLock { id } => {
            engine.release_lock(id).await?;
            Ok(Outcome::done("DELETE 1"))
        }
        Command::InsertBooking {
            id,
            lock_id,
            service_ids,
            returning,
        } => {
            let booking = engine.finalize_booking(id, lock_id, service_ids).await?;
            Ok(insert_outcome(
                returning,
                BOOKING_COLUMNS,
                booking_row(&booking),
            ))
        }
        Command::DeleteBooking { id } => {
            engine.cancel_booking(id).await?;
            Ok(Outcome::done("DELETE 1"))
        }
        Command::SelectStarts {
            staff_id,
            date,
            duration,
        } => {
            let starts = engine.find_available_starts(staff_id, date, duration).await?;
            let rows: Vec<_> = starts
                .iter()
                .map(|&m| vec![Some(m.to_string()), Some(fmt_minute(m))])
                .collect();
            let tag = format!("SELECT {}", rows.len());
            Ok(Outcome::rows(STARTS_COLUMNS, rows, tag))
        }
        Command::SelectGrid { staff_id, date } => {
            let rows: Vec<_> = engine
                .day_grid(staff_id, date)
                .await
                .iter()
                .map(grid_row)
                .collect();
            let tag = format!("SELECT {}", rows.len());
            Ok(Outcome::rows(GRID_COLUMNS, rows, tag))
        }
        Command::SelectLocks { staff_id, date } => {
            let rows: Vec<_> = engine
                .locks_for(staff_id, date)
                .await
                .iter()
                .map(lock_row)
                .collect();
            let tag = format!("SELECT {}", rows.len());
            Ok(Outcome::rows(LOCK_COLUMNS, rows, tag))
        }
        Command::SelectBookings { staff_id, date } => {
            let rows: Vec<_> = engine
                .bookings_for(staff_id, date)
                .await
                .iter()
                .map(booking_row)
                .collect();
            let tag = format!("SELECT {}", rows.len());
            Ok(Outcome::rows(BOOKING_COLUMNS, rows, tag))
        }
        Command::SelectBusinessDays { date } => {
            let days = match date {
                Some(date) => engine.business_day(date).into_iter().collect(),
                None => engine.business_days(),
            };
            let rows: Vec<_> = days.iter().map(business_day_row).collect();
            let tag = format!("SELECT {}", rows.len());
            Ok(Outcome::rows(BUSINESS_DAY_COLUMNS, rows, tag))
        }
        Command::Listen { channel } => listen(engine, listens, notif_tx, channel),
        Command::Unlisten { channel } => {
            if let Some(fwd) = listens.remove(&channel) {
                fwd.abort();
            }
            Ok(Outcome::done("UNLISTEN"))
        }
        Command::UnlistenAll => {
            for (_, fwd) in listens.drain() {
                fwd.abort();
            }
            Ok(Outcome::done("UNLISTEN"))
        }
    }
}

/// Subscribe to a staff-day channel and spawn the forwarder that turns
/// broadcast events into NOTIFY frames. A lagged forwarder synthesizes a
/// resync event instead of dropping changes silently.
fn listen(
    engine: &Arc<Engine>,
    listens: &mut HashMap<String, JoinHandle<()>>,
    notif_tx: &mpsc::UnboundedSender<(String, String)>,
    channel: String,
) -> Result<Outcome, QueryError> {
    let Some(key) = parse_day_channel(&channel) else {
        return Err(QueryError::BadChannel(format!(
            "invalid channel \"{channel}\", expected day_<staff_ulid>_<yyyymmdd>"
        )));
    };
    if listens.contains_key(&channel) {
        return Ok(Outcome::done("LISTEN"));
    }

    let mut rx = engine.notify.subscribe(key);
    let tx = notif_tx.clone();
    let name = channel.clone();
    let fwd = tokio::spawn(async move {
        loop {
            let payload = match rx.recv().await {
                Ok(change) => serde_json::to_string(&change).unwrap_or_default(),
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    serde_json::to_string(&SlotChange::resync(key)).unwrap_or_default()
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if tx.send((name.clone(), payload)).is_err() {
                break;
            }
        }
    });
    listens.insert(channel, fwd);
    Ok(Outcome::done("LISTEN"))
}

async fn send_error<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut Framed<S, PgCodec>,
    code: &'static str,
    message: String,
) -> io::Result<()> {
    framed.send(BackendMessage::Error { code, message }).await
}

// ── Row rendering ────────────────────────────────────────────────

const STARTS_COLUMNS: &[&str] = &["start_min", "start_time"];
const GRID_COLUMNS: &[&str] = &["start_min", "end_min", "state", "id"];
const LOCK_COLUMNS: &[&str] = &[
    "id",
    "staff_id",
    "date",
    "start_min",
    "end_min",
    "duration_min",
    "session",
    "created_at",
    "expires_at",
];
const BOOKING_COLUMNS: &[&str] = &[
    "id",
    "lock_id",
    "staff_id",
    "date",
    "start_min",
    "end_min",
    "duration_min",
    "service_ids",
];
const BUSINESS_DAY_COLUMNS: &[&str] = &["date", "open_min", "close_min", "holiday"];

fn schema_for(cmd: &Command) -> Option<&'static [&'static str]> {
    match cmd {
        Command::SelectStarts { .. } => Some(STARTS_COLUMNS),
        Command::SelectGrid { .. } => Some(GRID_COLUMNS),
        Command::SelectLocks { .. } => Some(LOCK_COLUMNS),
        Command::SelectBookings { .. } => Some(BOOKING_COLUMNS),
        Command::SelectBusinessDays { .. } => Some(BUSINESS_DAY_COLUMNS),
        Command::InsertBusinessDay {
            returning: true, ..
        } => Some(BUSINESS_DAY_COLUMNS),
        Command::InsertLock {
            returning: true, ..
        }
        | Command::UpdateLock {
            returning: true, ..
        } => Some(LOCK_COLUMNS),
        Command::InsertBooking {
            returning: true, ..
        } => Some(BOOKING_COLUMNS),
        _ => None,
    }
}

fn insert_outcome(
    returning: bool,
    columns: &'static [&'static str],
    row: Vec<Option<String>>,
) -> Outcome {
    if returning {
        Outcome::rows(columns, vec![row], "INSERT 0 1".to_string())
    } else {
        Outcome::done("INSERT 0 1")
    }
}

fn lock_row(lock: &ReservationLock) -> Vec<Option<String>> {
    vec![
        Some(lock.id.to_string()),
        Some(lock.staff_id.to_string()),
        Some(lock.date.to_string()),
        Some(lock.start_min.to_string()),
        Some(lock.end_min.to_string()),
        Some(lock.duration_min.to_string()),
        Some(lock.session.clone()),
        Some(lock.created_at.to_string()),
        Some(lock.expires_at.to_string()),
    ]
}

fn booking_row(booking: &Booking) -> Vec<Option<String>> {
    vec![
        Some(booking.id.to_string()),
        Some(booking.lock_id.to_string()),
        Some(booking.staff_id.to_string()),
        Some(booking.date.to_string()),
        Some(booking.start_min.to_string()),
        Some(booking.end_min.to_string()),
        Some(booking.duration_min.to_string()),
        Some(booking.service_ids.join(",")),
    ]
}

fn business_day_row(day: &BusinessDay) -> Vec<Option<String>> {
    vec![
        Some(day.date.to_string()),
        Some(day.open_min.to_string()),
        Some(day.close_min.to_string()),
        day.holiday.clone(),
    ]
}

fn grid_row(slot: &SlotInfo) -> Vec<Option<String>> {
    let (state, id) = match &slot.view {
        SlotView::Free => ("free", None),
        SlotView::Locked { lock_id, .. } => ("locked", Some(lock_id.to_string())),
        SlotView::Booked { booking_id } => ("booked", Some(booking_id.to_string())),
        SlotView::Blocked => ("blocked", None),
        SlotView::Holiday => ("holiday", None),
    };
    vec![
        Some(slot.start_min.to_string()),
        Some(slot.end_min.to_string()),
        Some(state.to_string()),
        id,
    ]
}

// ── Extended-protocol parameters ─────────────────────────────────

/// Highest `$N` placeholder in a statement.
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
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute `$1`, `$2`, ... with bound parameter text. Every value binds
/// as a quoted literal; the SQL layer re-parses types from the text.
fn substitute_params(sql: &str, params: &[Option<Vec<u8>>]) -> String {
    let mut result = sql.to_string();
    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}
