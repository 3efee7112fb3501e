/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `store`.)

Every request passes through `hydrate_session()`, which reads the
identity cookie into a `SessionState` extension. Guarded routes then pass
through one of the guard middlewares, which act on `route::evaluate()`.
*/
use std::{
    fmt::Debug,
    path::Path,
    sync::Arc,
};

use axum::{
    extract::Extension,
    http::{header, Request, StatusCode},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use handlebars::Handlebars;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;
use time::Date;
use tower_http::services::ServeDir;

use crate::auth::Authenticator;
use crate::config::Glob;
use crate::leave::{Leave, Status};
use crate::route::{evaluate, home, Decision, Policy, Route};
use crate::session::{CookieStorage, SessionState, SessionStore};
use crate::user::{Identity, Role};

pub mod admin;
pub mod student;

static TEMPLATES: OnceCell<Handlebars> = OnceCell::new();

static HTML_500: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>Leavex | Error</title>
<link rel="stylesheet" href="/static/leavex.css">
</head>
<body>
<h1>Internal Server Error</h1>
<p>(Error 500)</p>
<p>Something went wrong on our end. No further or more
helpful information is available about the problem.</p>
</body>
</html>"#;

/// Message shown when a view's data couldn't be fetched.
static FETCH_FAILED: &str = "Failed to load data. Please try again.";

trait AddHeaders: IntoResponse + Sized {
    fn add_headers(self, mut new_headers: Vec<(HeaderName, HeaderValue)>) -> Response {
        let mut r = self.into_response();
        let r_headers = r.headers_mut();
        for (name, value) in new_headers.drain(..) {
            r_headers.append(name, value);
        }

        r
    }
}

impl<T: IntoResponse + Sized> AddHeaders for T {}

/// Data type to read the form data from a login request.
#[derive(serde::Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub reg_no: String,
    #[serde(default)]
    pub password: String,
}

// Keeps the password out of the logs.
impl Debug for LoginData {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("LoginData")
            .field("reg_no", &self.reg_no)
            .field("password", &"[ redacted ]")
            .finish()
    }
}

/**
Initializes the resources used in this module. This function should be called
before any functionality of this module or any of its submodules is used.

Currently the only thing that happens here is loading the templates used by
`serve_template()`, which will respond with a 500 until `init()` has
succeeded.

The argument is the path to the directory where the templates used by
`serve_template()` can be found. Calling it again is harmless; the first
set of templates loaded stays.
*/
pub fn init<P: AsRef<Path>>(template_dir: P) -> Result<(), String> {
    let template_dir = template_dir.as_ref();

    TEMPLATES.get_or_try_init(|| {
        let mut h = Handlebars::new();
        #[cfg(debug_assertions)]
        h.set_dev_mode(true);
        h.register_templates_directory(".html", template_dir)
            .map_err(|e| format!(
                "Error registering templates directory {}: {}",
                template_dir.display(), &e
            ))?;
        log::trace!(
            "Registered {} templates from {}.",
            h.get_templates().len(), template_dir.display()
        );
        Ok::<Handlebars, String>(h)
    })?;

    Ok(())
}

/**
Return an HTML response in the case of an unrecoverable* error.

(*"Unrecoverable" from the perspective of fielding the current request,
not from the perspective of the program crashing.)
*/
pub fn html_500() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(HTML_500)
    ).into_response()
}

pub fn serve_template<S>(
    code: StatusCode,
    template_name: &str,
    data: &S,
    addl_headers: Vec<(HeaderName, HeaderValue)>
) -> Response
where
    S: Serialize + Debug
{
    log::trace!("serve_template( {}, {:?}, ... ) called.", &code, template_name);

    let templates = match TEMPLATES.get() {
        Some(t) => t,
        None => {
            log::error!("serve_template( {:?} ) called before inter::init().", template_name);
            return html_500();
        },
    };

    match templates.render(template_name, data) {
        Ok(response_body) => (
            code,
            Html(response_body)
        ).add_headers(addl_headers),
        Err(e) => {
            log::error!(
                "Error rendering template {:?} with data {:?}:\n{}",
                template_name, data, &e
            );
            html_500()
        },
    }
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    (
        StatusCode::BAD_REQUEST,
        msg
    ).into_response()
}

/// Redirect to `to`, carrying whatever cookie changes `storage` has made.
fn redirect_with_cookies(to: &str, storage: &CookieStorage) -> Response {
    let mut headers: Vec<(HeaderName, HeaderValue)> = Vec::new();
    for c in storage.set_cookies().iter() {
        match HeaderValue::from_str(c) {
            Ok(v) => headers.push((header::SET_COOKIE, v)),
            Err(e) => {
                log::error!("Unable to make a Set-Cookie header value: {}", &e);
                return html_500();
            },
        }
    }

    Redirect::to(to).add_headers(headers)
}

/// The navigation bar's view of who is logged in.
fn nav_data(id: &Identity) -> serde_json::Value {
    json!({
        "name": id.display_name(),
        "reg_no": id.reg_no(),
        "is_admin": id.role() == Role::Admin,
        "is_student": id.role() == Role::Student,
    })
}

fn date_str(d: Date) -> String {
    d.format(crate::DATE_FMT).unwrap_or_else(|e| {
        log::error!("Error formatting date {:?}: {}", &d, &e);
        d.to_string()
    })
}

fn duration_label(days: i64) -> String {
    match days {
        1 => "1 day".to_owned(),
        n => format!("{} days", n),
    }
}

/// A leave as the tables show it.
#[derive(Debug, Serialize)]
struct LeaveRow<'a> {
    #[serde(flatten)]
    leave: &'a Leave,
    duration: String,
    applied_on: String,
    pending: bool,
}

impl<'a> LeaveRow<'a> {
    fn new(leave: &'a Leave) -> Self {
        LeaveRow {
            leave,
            duration: duration_label(leave.duration_days()),
            applied_on: date_str(leave.applied_at.date()),
            pending: leave.status == Status::Pending,
        }
    }
}

fn glob_from<B>(req: &Request<B>) -> Option<Arc<Glob>> {
    req.extensions().get::<Arc<Glob>>().cloned()
}

/// Middleware function to read the identity cookie into a `SessionState`
/// extension for the guards and handlers downstream.
pub async fn hydrate_session<B>(
    mut req: Request<B>,
    next: Next<B>
) -> Response {
    let glob = match glob_from(&req) {
        Some(g) => g,
        None => {
            log::error!("hydrate_session() found no Glob extension.");
            return html_500();
        },
    };

    let sess = SessionStore::new(
        CookieStorage::from_headers(req.headers()),
        glob.codec.clone()
    );
    let state = SessionState::hydrate(&sess);
    log::trace!(
        "Request for {} from {:?}.",
        req.uri().path(), state.identity().map(|id| id.reg_no())
    );
    req.extensions_mut().insert(state);

    next.run(req).await
}

fn respond_waiting() -> Response {
    serve_template(
        StatusCode::OK,
        "waiting",
        &json!({}),
        vec![(HeaderName::from_static("refresh"), HeaderValue::from_static("1"))]
    )
}

async fn apply_policy<B>(
    policy: Policy,
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let decision = match req.extensions().get::<SessionState>() {
        Some(state) => evaluate(state, policy),
        None => evaluate(&SessionState::Loading, policy),
    };

    match decision {
        Decision::Permit => next.run(req).await,
        Decision::Redirect(route) => {
            log::trace!(
                "{} guarded by {:?}; redirecting to {}.",
                req.uri().path(), &policy, route.path()
            );
            Redirect::to(route.path()).into_response()
        },
        Decision::Wait => respond_waiting(),
    }
}

pub async fn guest_only<B>(req: Request<B>, next: Next<B>) -> Response {
    apply_policy(Policy::GuestOnly, req, next).await
}

pub async fn admin_only<B>(req: Request<B>, next: Next<B>) -> Response {
    apply_policy(Policy::Require(Role::Admin), req, next).await
}

pub async fn student_only<B>(req: Request<B>, next: Next<B>) -> Response {
    apply_policy(Policy::Require(Role::Student), req, next).await
}

async fn root() -> Redirect {
    Redirect::to(Route::Login.path())
}

pub async fn login_page() -> Response {
    serve_template(
        StatusCode::OK,
        "login",
        &json!({ "reg_no": "" }),
        vec![]
    )
}

pub async fn login(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
    Form(form): Form<LoginData>,
) -> Response {
    log::trace!("login( {:?} ) called.", &form);

    let reg_no = form.reg_no.as_str();
    if reg_no.is_empty() || form.password.is_empty() {
        return serve_template(
            StatusCode::BAD_REQUEST,
            "login",
            &json!({
                "reg_no": reg_no,
                "error": "Registration number and password are required.",
            }),
            vec![]
        );
    }

    let mut sess = SessionStore::new(
        CookieStorage::from_headers(&headers),
        glob.codec.clone()
    );
    let auth = Authenticator::new(glob.store.as_ref(), glob.verifier.as_ref());

    match auth.login(reg_no, &form.password, &mut sess).await {
        Ok(id) => redirect_with_cookies(home(id.role()).path(), sess.storage()),
        Err(e) => serve_template(
            StatusCode::UNAUTHORIZED,
            "login",
            &json!({
                "reg_no": reg_no,
                "error": e.to_string(),
            }),
            vec![]
        ),
    }
}

pub async fn logout(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("logout() called.");

    let mut sess = SessionStore::new(
        CookieStorage::from_headers(&headers),
        glob.codec.clone()
    );
    sess.clear();
    redirect_with_cookies(Route::Login.path(), sess.storage())
}

/// Assemble the whole application around `glob`.
pub fn app(glob: Arc<Glob>) -> Router {
    let guest_routes = Router::new()
        .route(Route::Login.path(), get(login_page).post(login))
        .route_layer(middleware::from_fn(guest_only));

    let admin_routes = Router::new()
        .route("/admin", get(|| async { Redirect::to(Route::AdminDashboard.path()) }))
        .route(Route::AdminDashboard.path(), get(admin::dashboard))
        .route(Route::AdminStudents.path(), get(admin::students))
        .route(Route::AdminApplications.path(), get(admin::applications))
        .route("/admin/applications/:id/review", post(admin::review))
        .route(
            Route::AdminAddStudent.path(),
            get(admin::add_student_page).post(admin::add_student)
        )
        .route_layer(middleware::from_fn(admin_only));

    let student_routes = Router::new()
        .route("/student", get(|| async { Redirect::to(Route::StudentDashboard.path()) }))
        .route(Route::StudentDashboard.path(), get(student::dashboard))
        .route(Route::StudentLeaves.path(), get(student::leaves))
        .route(
            Route::StudentApplyLeave.path(),
            get(student::apply_leave_page).post(student::apply_leave)
        )
        .route_layer(middleware::from_fn(student_only));

    let serve_static = ServeDir::new(&glob.static_dir);

    Router::new()
        .route("/", get(root))
        .route("/logout", post(logout))
        .merge(guest_routes)
        .merge(admin_routes)
        .merge(student_routes)
        .nest_service("/static", serve_static)
        .layer(middleware::from_fn(hydrate_session))
        .layer(Extension(glob))
}
