/*!
Views for Student users: their dashboard, their leave history, and the
Apply Leave form.
*/
use std::sync::Arc;

use axum::extract::Extension;

use crate::error::{OpError, ValidationError};
use crate::leave::{LeaveForm, Tally, LEAVE_TYPES};
use crate::user::Student;
use super::*;

/// How many applications the dashboard lists.
const RECENT: usize = 5;

fn student_of(state: &SessionState) -> Option<&Student> {
    match state.identity() {
        Some(Identity::Student(s)) => Some(s),
        _ => None,
    }
}

pub async fn dashboard(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(state): Extension<SessionState>,
) -> Response {
    let s = match student_of(&state) {
        Some(s) => s,
        None => { return Redirect::to(Route::Login.path()).into_response(); },
    };
    log::trace!("student::dashboard() called for {:?}.", &s.reg_no);

    let (leaves, error) = match glob.store.leaves_by_student(s.id).await {
        Ok(v) => (v, None),
        Err(e) => {
            log::error!("Error fetching leaves for student {}: {}", s.id, &e);
            (Vec::new(), Some(FETCH_FAILED))
        },
    };

    let recent: Vec<LeaveRow> = leaves.iter().take(RECENT).map(LeaveRow::new).collect();
    let data = json!({
        "user": state.identity().map(nav_data),
        "student": s,
        "tally": Tally::of(leaves.iter()),
        "recent": recent,
        "error": error,
    });

    serve_template(StatusCode::OK, "student_dashboard", &data, vec![])
}

pub async fn leaves(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(state): Extension<SessionState>,
) -> Response {
    let s = match student_of(&state) {
        Some(s) => s,
        None => { return Redirect::to(Route::Login.path()).into_response(); },
    };
    log::trace!("student::leaves() called for {:?}.", &s.reg_no);

    let (leaves, error) = match glob.store.leaves_by_student(s.id).await {
        Ok(v) => (v, None),
        Err(e) => {
            log::error!("Error fetching leaves for student {}: {}", s.id, &e);
            (Vec::new(), Some(FETCH_FAILED))
        },
    };

    let rows: Vec<LeaveRow> = leaves.iter().map(LeaveRow::new).collect();
    let data = json!({
        "user": state.identity().map(nav_data),
        "leaves": rows,
        "error": error,
    });

    serve_template(StatusCode::OK, "student_leaves", &data, vec![])
}

fn apply_leave_view(
    code: StatusCode,
    glob: &Glob,
    state: &SessionState,
    form: &LeaveForm,
    error: Option<String>,
    success: Option<&str>,
) -> Response {
    let today = crate::today_at(glob.utc_offset);
    let tomorrow = today.next_day().unwrap_or(today);
    let types: Vec<_> = LEAVE_TYPES.iter()
        .map(|t| json!({ "value": t, "selected": *t == form.leave_type }))
        .collect();

    let data = json!({
        "user": state.identity().map(nav_data),
        "types": types,
        "min_date": date_str(tomorrow),
        "form": form,
        "error": error,
        "success": success,
    });

    serve_template(code, "apply_leave", &data, vec![])
}

pub async fn apply_leave_page(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(state): Extension<SessionState>,
) -> Response {
    apply_leave_view(StatusCode::OK, &glob, &state, &LeaveForm::default(), None, None)
}

pub async fn apply_leave(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(state): Extension<SessionState>,
    Form(form): Form<LeaveForm>,
) -> Response {
    log::trace!("student::apply_leave( {:?} ) called.", &form);

    let res: Result<_, OpError> = match student_of(&state) {
        None => Err(ValidationError::NotAStudent.into()),
        Some(s) => match form.validate(crate::today_at(glob.utc_offset)) {
            Err(e) => Err(e.into()),
            Ok(nl) => glob.store.insert_leave(s.id, &nl, crate::now()).await
                .map_err(OpError::from),
        },
    };

    match res {
        Ok(l) => {
            log::info!("Student {} applied for leave {}.", l.student_id, l.id);
            apply_leave_view(
                StatusCode::OK, &glob, &state, &LeaveForm::default(), None,
                Some("Leave application submitted successfully")
            )
        },
        Err(e) => {
            if let OpError::Transient(s) = &e {
                log::error!("Error inserting leave: {}", s);
            }
            apply_leave_view(
                StatusCode::BAD_REQUEST, &glob, &state, &form,
                Some(e.user_message("leave application")), None
            )
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    use crate::inter::tests::*;
    use crate::leave::Status;
    use crate::store::DataStore;
    use crate::user::tests::sample_form;

    async fn student_app() -> (Router, Arc<crate::store::MemStore>, String) {
        let (glob, store) = test_glob().await;
        store.insert_student(&sample_form("CS2024001", "2005-03-15").validate().unwrap())
            .await.unwrap();
        let app = app(glob);
        let c = log_in(&app, "reg_no=CS2024001&password=20050315").await;
        (app, store, c)
    }

    #[tokio::test]
    async fn apply_form_offers_tomorrow_onward() {
        let (app, _, c) = student_app().await;
        let r = app.clone().oneshot(get_req("/student/apply-leave", Some(&c))).await.unwrap();
        let page = body(r).await;
        let tomorrow = date_str(crate::today_at(time::UtcOffset::UTC).next_day().unwrap());
        assert!(page.contains(&format!(r#"min="{}""#, tomorrow)));
        for t in LEAVE_TYPES.iter() {
            assert!(page.contains(t));
        }
    }

    #[tokio::test]
    async fn bad_dates_insert_nothing() {
        let (app, store, c) = student_app().await;

        let r = app.clone().oneshot(post_req(
            "/student/apply-leave", Some(&c),
            "leave_type=Medical+Leave&start_date=2030-03-10&end_date=2030-03-05&reason=fever"
        )).await.unwrap();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);
        assert!(body(r).await.contains("End date cannot be before start date"));

        let r = app.clone().oneshot(post_req(
            "/student/apply-leave", Some(&c),
            "leave_type=Medical+Leave&start_date=2001-03-10&end_date=2001-03-12&reason=fever"
        )).await.unwrap();
        assert!(body(r).await.contains("Start date cannot be in the past"));

        let r = app.clone().oneshot(post_req(
            "/student/apply-leave", Some(&c),
            "leave_type=Medical+Leave&start_date=2030-03-10&end_date=2030-03-12&reason=+++"
        )).await.unwrap();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);

        assert_eq!(store.count_leaves(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_failure_suggests_retry() {
        let (app, store, c) = student_app().await;
        store.set_offline(true);
        let r = app.clone().oneshot(post_req(
            "/student/apply-leave", Some(&c),
            "leave_type=Medical+Leave&start_date=2030-03-10&end_date=2030-03-12&reason=fever"
        )).await.unwrap();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);
        assert!(body(r).await.contains("Failed to submit leave application. Please try again."));
    }

    #[tokio::test]
    async fn dashboard_tallies_and_recent() {
        let (app, store, c) = student_app().await;
        let s = store.student_by_reg_no("CS2024001").await.unwrap().unwrap();
        for _ in 0..7 {
            let r = app.clone().oneshot(post_req(
                "/student/apply-leave", Some(&c),
                "leave_type=Personal+Leave&start_date=2030-03-10&end_date=2030-03-11&reason=home"
            )).await.unwrap();
            assert_eq!(r.status(), StatusCode::OK);
        }
        let first = store.leaves_by_student(s.id).await.unwrap()[0].id;
        store.review_leave(first, crate::leave::Verdict::Rejected, crate::now()).await.unwrap();

        let r = app.clone().oneshot(get_req("/student/dashboard", Some(&c))).await.unwrap();
        let page = body(r).await;
        assert!(page.contains(r#"<span class="stat" id="total">7</span>"#));
        assert!(page.contains(r#"<span class="stat" id="pending">6</span>"#));
        assert!(page.contains(r#"<span class="stat" id="rejected">1</span>"#));
        assert_eq!(page.matches("<tr class=\"leave status-").count(), RECENT);

        let r = app.clone().oneshot(get_req("/student/leaves", Some(&c))).await.unwrap();
        let page = body(r).await;
        assert_eq!(page.matches("<tr class=\"leave status-").count(), 7);
        assert!(page.contains("1 day"));
        assert_eq!(
            store.count_leaves(Some(Status::Pending)).await.unwrap(),
            6
        );
    }
}
