/*!
Views for Admin users: the dashboard, the student and application lists,
reviewing applications, and adding students.
*/
use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use serde::Deserialize;

use crate::error::OpError;
use crate::leave::{LeaveWithStudent, ReviewOutcome, Verdict};
use crate::user::{StudentForm, YEAR_OPTIONS};
use super::*;

static STATUS_FILTERS: &[(&str, &str)] = &[
    ("all", "All"),
    ("pending", "Pending"),
    ("accepted", "Accepted"),
    ("rejected", "Rejected"),
];

/// Query string of the list views.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub notice: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewForm {
    pub verdict: Verdict,
}

#[derive(Debug, Serialize)]
struct ApplicationRow<'a> {
    #[serde(flatten)]
    row: LeaveRow<'a>,
    student: &'a crate::user::Student,
}

fn admin_nav(state: &SessionState) -> serde_json::Value {
    match state.identity() {
        Some(id) => nav_data(id),
        None => serde_json::Value::Null,
    }
}

pub async fn dashboard(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(state): Extension<SessionState>,
) -> Response {
    log::trace!("admin::dashboard() called.");

    let store = glob.store.as_ref();
    let counts = futures::try_join!(
        store.count_students(),
        store.count_leaves(None),
        store.count_leaves(Some(Status::Pending)),
        store.count_leaves(Some(Status::Accepted)),
        store.count_leaves(Some(Status::Rejected)),
    );

    let (stats, error) = match counts {
        Ok((students, total, pending, accepted, rejected)) => (
            json!({
                "students": students,
                "total": total,
                "pending": pending,
                "accepted": accepted,
                "rejected": rejected,
            }),
            None
        ),
        Err(e) => {
            log::error!("Error fetching dashboard counts: {}", &e);
            (
                json!({
                    "students": 0, "total": 0, "pending": 0,
                    "accepted": 0, "rejected": 0,
                }),
                Some(FETCH_FAILED)
            )
        },
    };

    let data = json!({
        "user": admin_nav(&state),
        "stats": stats,
        "error": error,
    });

    serve_template(StatusCode::OK, "admin_dashboard", &data, vec![])
}

pub async fn students(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(state): Extension<SessionState>,
    Query(q): Query<ListQuery>,
) -> Response {
    log::trace!("admin::students( {:?} ) called.", &q);

    let (all, error) = match glob.store.students().await {
        Ok(v) => (v, None),
        Err(e) => {
            log::error!("Error fetching students: {}", &e);
            (Vec::new(), Some(FETCH_FAILED))
        },
    };

    let shown: Vec<_> = all.iter().filter(|s| s.matches(&q.search)).collect();

    let data = json!({
        "user": admin_nav(&state),
        "search": &q.search,
        "students": shown,
        "shown": shown.len(),
        "total": all.len(),
        "error": error,
    });

    serve_template(StatusCode::OK, "admin_students", &data, vec![])
}

fn notice_text(notice: &str) -> Option<&'static str> {
    match notice {
        "reviewed" => Some("Leave application updated."),
        "already_reviewed" => Some("This application has already been reviewed."),
        "not_found" => Some("No such leave application."),
        "failed" => Some("Failed to update leave status. Please try again."),
        _ => None,
    }
}

pub async fn applications(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(state): Extension<SessionState>,
    Query(q): Query<ListQuery>,
) -> Response {
    log::trace!("admin::applications( {:?} ) called.", &q);

    let status: Option<Status> = match q.status.as_str() {
        "" | "all" => None,
        s => match s.parse() {
            Ok(status) => Some(status),
            Err(e) => {
                return respond_bad_request(format!("Bad status filter: {}", &e));
            },
        },
    };

    let (all, error) = match glob.store.leaves_with_students().await {
        Ok(v) => (v, None),
        Err(e) => {
            log::error!("Error fetching leave applications: {}", &e);
            (Vec::new(), Some(FETCH_FAILED))
        },
    };

    let shown: Vec<ApplicationRow> = all.iter()
        .filter(|a: &&LeaveWithStudent| status.map(|s| a.leave.status == s).unwrap_or(true))
        .filter(|a| a.matches(&q.search))
        .map(|a| ApplicationRow { row: LeaveRow::new(&a.leave), student: &a.student })
        .collect();

    let selected = status.map(|s| s.as_str()).unwrap_or("all");
    let filters: Vec<_> = STATUS_FILTERS.iter()
        .map(|(value, label)| json!({
            "value": value,
            "label": label,
            "selected": *value == selected,
        }))
        .collect();

    let data = json!({
        "user": admin_nav(&state),
        "search": &q.search,
        "filters": filters,
        "applications": shown,
        "shown": shown.len(),
        "total": all.len(),
        "notice": notice_text(&q.notice),
        "error": error,
    });

    serve_template(StatusCode::OK, "admin_applications", &data, vec![])
}

/// Move a pending application to the verdict's status, then go back to
/// the list.
pub async fn review(
    Extension(glob): Extension<Arc<Glob>>,
    Path(id): Path<i64>,
    Form(form): Form<ReviewForm>,
) -> Response {
    log::trace!("admin::review( {}, {:?} ) called.", id, &form);

    let notice = match glob.store.review_leave(id, form.verdict, crate::now()).await {
        Ok(ReviewOutcome::Applied) => {
            log::info!("Leave {} reviewed: {:?}.", id, &form.verdict);
            "reviewed"
        },
        Ok(ReviewOutcome::AlreadyReviewed) => {
            log::info!("Leave {} not pending; review ignored.", id);
            "already_reviewed"
        },
        Ok(ReviewOutcome::NotFound) => {
            log::info!("No leave {} to review.", id);
            "not_found"
        },
        Err(e) => {
            log::error!("Error reviewing leave {}: {}", id, &e);
            "failed"
        },
    };

    Redirect::to(&format!("{}?notice={}", Route::AdminApplications.path(), notice))
        .into_response()
}

fn year_options(selected: &str) -> Vec<serde_json::Value> {
    YEAR_OPTIONS.iter()
        .map(|y| json!({ "value": y, "selected": *y == selected }))
        .collect()
}

fn add_student_view(
    code: StatusCode,
    state: &SessionState,
    form: &StudentForm,
    error: Option<String>,
    created: Option<serde_json::Value>,
) -> Response {
    let data = json!({
        "user": admin_nav(state),
        "years": year_options(&form.year_of_study),
        "form": form,
        "error": error,
        "created": created,
    });

    serve_template(code, "add_student", &data, vec![])
}

pub async fn add_student_page(
    Extension(state): Extension<SessionState>,
) -> Response {
    add_student_view(StatusCode::OK, &state, &StudentForm::default(), None, None)
}

pub async fn add_student(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(state): Extension<SessionState>,
    Form(form): Form<StudentForm>,
) -> Response {
    log::trace!("admin::add_student( {:?} ) called.", &form.reg_no);

    let res: Result<_, OpError> = match form.validate() {
        Err(e) => Err(e.into()),
        Ok(ns) => glob.store.insert_student(&ns).await.map_err(OpError::from),
    };

    match res {
        Ok(s) => {
            log::info!("Student {:?} added.", &s.reg_no);
            let created = json!({
                "name": &s.name,
                "reg_no": &s.reg_no,
                "secret": s.login_secret(),
            });
            add_student_view(StatusCode::OK, &state, &StudentForm::default(), None, Some(created))
        },
        Err(e) => {
            match &e {
                OpError::Transient(s) => log::error!("Error adding student {:?}: {}", &form.reg_no, s),
                e => log::info!("Student {:?} not added: {}", &form.reg_no, e),
            }
            add_student_view(
                StatusCode::BAD_REQUEST, &state, &form,
                Some(e.user_message("student")), None
            )
        },
    }
}
