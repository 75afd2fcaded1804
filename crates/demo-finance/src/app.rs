//! HTTP routes for the finance application

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::LOCATION, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::quotes::{usd, QuoteSource};
use crate::store::{FinanceStore, StoreError};

const SESSION_COOKIE: &str = "session";

/// Shared application state
pub struct AppState {
    pub store: FinanceStore,
    pub quotes: QuoteSource,
    sessions: Mutex<HashMap<String, i64>>,
}

impl AppState {
    pub fn new(store: FinanceStore, quotes: QuoteSource) -> Self {
        Self {
            store,
            quotes,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn current_user(&self, jar: &CookieJar) -> Option<i64> {
        let id = jar.get(SESSION_COOKIE)?;
        self.sessions.lock().get(id.value()).copied()
    }

    fn log_in(&self, jar: CookieJar, user_id: i64) -> CookieJar {
        let id = Uuid::new_v4().to_string();
        self.sessions.lock().insert(id.clone(), user_id);
        jar.add(
            Cookie::build((SESSION_COOKIE, id))
                .path("/")
                .http_only(true),
        )
    }

    fn log_out(&self, jar: CookieJar) -> CookieJar {
        if let Some(id) = jar.get(SESSION_COOKIE) {
            self.sessions.lock().remove(id.value());
        }
        jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
    }
}

/// Handler failure rendered as an apology page
#[derive(Debug)]
pub enum AppError {
    Apology(StatusCode, &'static str),
    Store(StoreError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateUser => AppError::Apology(StatusCode::BAD_REQUEST, "username already exists"),
            StoreError::InsufficientCash => AppError::Apology(StatusCode::BAD_REQUEST, "can't afford"),
            StoreError::InsufficientShares => AppError::Apology(StatusCode::BAD_REQUEST, "too many shares"),
            other => AppError::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Apology(status, message) => apology(status, message),
            AppError::Store(e) => {
                error!("Store error: {}", e);
                apology(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

type AppResult = Result<Response, AppError>;

fn bad_request(message: &'static str) -> AppError {
    AppError::Apology(StatusCode::BAD_REQUEST, message)
}

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/login", get(login_page_handler).post(login_handler))
        .route("/logout", get(logout_handler))
        .route("/register", get(register_page_handler).post(register_handler))
        .route("/quote", get(quote_page_handler).post(quote_handler))
        .route("/buy", get(buy_page_handler).post(buy_handler))
        .route("/sell", get(sell_page_handler).post(sell_handler))
        .route("/history", get(history_handler))
        .with_state(state)
}

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    confirmation: String,
}

#[derive(Deserialize)]
struct SymbolForm {
    #[serde(default)]
    symbol: String,
}

#[derive(Deserialize)]
struct TradeForm {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    shares: String,
}

async fn index_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> AppResult {
    let Some(user_id) = state.current_user(&jar) else {
        return Ok(found("/login"));
    };

    let cash = state.store.cash(user_id)?;
    let mut rows = String::new();
    let mut total = cash;
    for holding in state.store.holdings(user_id)? {
        let price = state
            .quotes
            .lookup(&holding.symbol)
            .map(|q| q.price)
            .unwrap_or_default();
        let value = price * holding.shares as f64;
        total += value;
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            holding.symbol,
            holding.shares,
            usd(price),
            usd(value)
        ));
    }

    Ok(page(
        "Portfolio",
        &format!(
            "<table><thead><tr><th>Symbol</th><th>Shares</th><th>Price</th><th>TOTAL</th></tr></thead>\
             <tbody>{rows}</tbody>\
             <tfoot><tr><td colspan=\"3\">Cash</td><td>{}</td></tr>\
             <tr><td colspan=\"3\">TOTAL</td><td>{}</td></tr></tfoot></table>",
            usd(cash),
            usd(total)
        ),
    ))
}

async fn login_page_handler() -> Response {
    page(
        "Log In",
        r#"<form action="/login" method="post">
<input autocomplete="off" autofocus name="username" placeholder="Username" type="text">
<input name="password" placeholder="Password" type="password">
<button type="submit">Log In</button>
</form>"#,
    )
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<Credentials>,
) -> AppResult {
    let jar = state.log_out(jar);
    if form.username.is_empty() {
        return Err(AppError::Apology(StatusCode::FORBIDDEN, "must provide username"));
    }
    if form.password.is_empty() {
        return Err(AppError::Apology(StatusCode::FORBIDDEN, "must provide password"));
    }

    match state.store.authenticate(&form.username, &form.password)? {
        Some(user_id) => {
            info!("User {} logged in", user_id);
            Ok((state.log_in(jar, user_id), found("/")).into_response())
        }
        None => Err(AppError::Apology(
            StatusCode::FORBIDDEN,
            "invalid username and/or password",
        )),
    }
}

async fn logout_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    (state.log_out(jar), found("/")).into_response()
}

async fn register_page_handler() -> Response {
    page(
        "Register",
        r#"<form action="/register" method="post">
<input autocomplete="off" autofocus name="username" placeholder="Username" type="text">
<input name="password" placeholder="Password" type="password">
<input name="confirmation" placeholder="Password (again)" type="password">
<button type="submit">Register</button>
</form>"#,
    )
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<Credentials>,
) -> AppResult {
    if form.username.is_empty() {
        return Err(bad_request("must provide username"));
    }
    if form.password.is_empty() {
        return Err(bad_request("must provide password"));
    }
    if form.password != form.confirmation {
        return Err(bad_request("passwords don't match"));
    }

    let user_id = state.store.create_user(&form.username, &form.password)?;
    info!("Registered user {}", user_id);
    Ok((state.log_in(jar, user_id), found("/")).into_response())
}

async fn quote_page_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if state.current_user(&jar).is_none() {
        return found("/login");
    }
    page(
        "Quote",
        r#"<form action="/quote" method="post">
<input autocomplete="off" autofocus name="symbol" placeholder="Symbol" type="text">
<button type="submit">Quote</button>
</form>"#,
    )
}

async fn quote_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<SymbolForm>,
) -> AppResult {
    if state.current_user(&jar).is_none() {
        return Ok(found("/login"));
    }
    if form.symbol.trim().is_empty() {
        return Err(bad_request("must provide symbol"));
    }
    let quote = state
        .quotes
        .lookup(&form.symbol)
        .ok_or_else(|| bad_request("invalid symbol"))?;

    Ok(page(
        "Quoted",
        &format!(
            "<p>A share of {} ({}) costs {}.</p>",
            quote.name,
            quote.symbol,
            usd(quote.price)
        ),
    ))
}

async fn buy_page_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if state.current_user(&jar).is_none() {
        return found("/login");
    }
    page(
        "Buy",
        r#"<form action="/buy" method="post">
<input autocomplete="off" autofocus name="symbol" placeholder="Symbol" type="text">
<input min="1" name="shares" placeholder="Shares" type="number">
<button type="submit">Buy</button>
</form>"#,
    )
}

async fn buy_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<TradeForm>,
) -> AppResult {
    let Some(user_id) = state.current_user(&jar) else {
        return Ok(found("/login"));
    };
    if form.symbol.trim().is_empty() {
        return Err(bad_request("must provide symbol"));
    }
    let quote = state
        .quotes
        .lookup(&form.symbol)
        .ok_or_else(|| bad_request("invalid symbol"))?;
    let shares = parse_shares(&form.shares)?;

    state.store.trade(user_id, &quote.symbol, shares, quote.price)?;
    info!("User {} bought {} {}", user_id, shares, quote.symbol);
    Ok(found("/"))
}

async fn sell_page_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> AppResult {
    let Some(user_id) = state.current_user(&jar) else {
        return Ok(found("/login"));
    };

    let options: String = state
        .store
        .holdings(user_id)?
        .into_iter()
        .map(|h| format!("<option value=\"{0}\">{0}</option>", h.symbol))
        .collect();

    Ok(page(
        "Sell",
        &format!(
            "<form action=\"/sell\" method=\"post\">\n\
             <select name=\"symbol\"><option disabled selected>Symbol</option>{options}</select>\n\
             <input min=\"1\" name=\"shares\" placeholder=\"Shares\" type=\"number\">\n\
             <button type=\"submit\">Sell</button>\n\
             </form>"
        ),
    ))
}

async fn sell_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<TradeForm>,
) -> AppResult {
    let Some(user_id) = state.current_user(&jar) else {
        return Ok(found("/login"));
    };
    let symbol = form.symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(bad_request("must provide symbol"));
    }
    let shares = parse_shares(&form.shares)?;
    if state.store.shares_owned(user_id, &symbol)? == 0 {
        return Err(bad_request("symbol not owned"));
    }
    let quote = state
        .quotes
        .lookup(&symbol)
        .ok_or_else(|| bad_request("invalid symbol"))?;

    state.store.trade(user_id, &quote.symbol, -shares, quote.price)?;
    info!("User {} sold {} {}", user_id, shares, quote.symbol);
    Ok(found("/"))
}

async fn history_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> AppResult {
    let Some(user_id) = state.current_user(&jar) else {
        return Ok(found("/login"));
    };

    let rows: String = state
        .store
        .history(user_id)?
        .into_iter()
        .map(|t| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                t.symbol,
                t.shares,
                usd(t.price),
                t.timestamp
            )
        })
        .collect();

    Ok(page(
        "History",
        &format!(
            "<table><thead><tr><th>Symbol</th><th>Shares</th><th>Price</th><th>Transacted</th></tr></thead>\
             <tbody>{rows}</tbody></table>"
        ),
    ))
}

/// Shares must be a positive whole number
fn parse_shares(raw: &str) -> Result<i64, AppError> {
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(bad_request("shares must be a positive integer")),
    }
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

fn apology(status: StatusCode, message: &str) -> Response {
    let body = format!("<p>{} {}</p>", status.as_u16(), message);
    (status, page_html("Apology", &body)).into_response()
}

fn page(title: &str, body: &str) -> Response {
    page_html(title, body).into_response()
}

fn page_html(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>C$50 Finance: {title}</title></head>\n\
         <body>\n<nav><a href=\"/quote\">Quote</a> <a href=\"/buy\">Buy</a> <a href=\"/sell\">Sell</a> \
         <a href=\"/history\">History</a> <a href=\"/logout\">Log Out</a></nav>\n<main>{body}</main>\n</body>\n</html>\n"
    ))
}
