/*!
Which views an identity may see, and where it goes instead.

Everything here is a pure function of the session state and the route
being asked for; the middleware in `inter` just acts on the `Decision`.
*/
use crate::session::SessionState;
use crate::user::Role;

/// The guarded views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    AdminDashboard,
    AdminStudents,
    AdminApplications,
    AdminAddStudent,
    StudentDashboard,
    StudentLeaves,
    StudentApplyLeave,
}

#[cfg(test)]
static ROUTES: &[Route] = &[
    Route::Login,
    Route::AdminDashboard,
    Route::AdminStudents,
    Route::AdminApplications,
    Route::AdminAddStudent,
    Route::StudentDashboard,
    Route::StudentLeaves,
    Route::StudentApplyLeave,
];

/// Each role's landing view. The one place this mapping lives.
static HOMES: &[(Role, Route)] = &[
    (Role::Admin, Route::AdminDashboard),
    (Role::Student, Route::StudentDashboard),
];

pub fn home(role: Role) -> Route {
    for (r, route) in HOMES.iter() {
        if *r == role {
            return *route;
        }
    }
    Route::Login
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Policy {
    /// Only reachable with nobody logged in.
    GuestOnly,
    /// Only reachable by an identity with this role.
    Require(Role),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The session hasn't been read yet; show the waiting view.
    Wait,
    Permit,
    Redirect(Route),
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::AdminDashboard => "/admin/dashboard",
            Route::AdminStudents => "/admin/students",
            Route::AdminApplications => "/admin/applications",
            Route::AdminAddStudent => "/admin/add-student",
            Route::StudentDashboard => "/student/dashboard",
            Route::StudentLeaves => "/student/leaves",
            Route::StudentApplyLeave => "/student/apply-leave",
        }
    }

    pub fn policy(&self) -> Policy {
        match self {
            Route::Login => Policy::GuestOnly,
            Route::AdminDashboard
            | Route::AdminStudents
            | Route::AdminApplications
            | Route::AdminAddStudent => Policy::Require(Role::Admin),
            Route::StudentDashboard
            | Route::StudentLeaves
            | Route::StudentApplyLeave => Policy::Require(Role::Student),
        }
    }
}

/**
Decide what happens to a request governed by `policy`.

A role mismatch sends the identity to its own home, never to the login
view.
*/
pub fn evaluate(state: &SessionState, policy: Policy) -> Decision {
    let id = match state {
        SessionState::Loading => { return Decision::Wait; },
        SessionState::Ready(id) => id.as_ref(),
    };

    match (policy, id) {
        (Policy::GuestOnly, None) => Decision::Permit,
        (Policy::GuestOnly, Some(id)) => Decision::Redirect(home(id.role())),
        (Policy::Require(_), None) => Decision::Redirect(Route::Login),
        (Policy::Require(role), Some(id)) => {
            if id.role() == role {
                Decision::Permit
            } else {
                Decision::Redirect(home(id.role()))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    use crate::user::{tests::sample_student, Admin, Identity};

    fn states() -> Vec<SessionState> {
        vec![
            SessionState::Loading,
            SessionState::Ready(None),
            SessionState::Ready(Some(Identity::Admin(Admin {
                id: 1,
                reg_no: "ADMIN001".to_owned(),
                created_at: datetime!(2024-01-01 00:00 UTC),
            }))),
            SessionState::Ready(Some(Identity::Student(
                sample_student(2, "CS2024001", date!(2005 - 03 - 15))
            ))),
        ]
    }

    #[test]
    fn homes() {
        assert_eq!(home(Role::Admin).path(), "/admin/dashboard");
        assert_eq!(home(Role::Student).path(), "/student/dashboard");
    }

    #[test]
    fn paths_are_distinct() {
        for (i, a) in ROUTES.iter().enumerate() {
            assert!(a.path().starts_with('/'));
            for b in ROUTES[i + 1..].iter() {
                assert_ne!(a.path(), b.path());
            }
        }
    }

    #[test]
    fn guest_only() {
        let s = states();
        assert_eq!(evaluate(&s[0], Policy::GuestOnly), Decision::Wait);
        assert_eq!(evaluate(&s[1], Policy::GuestOnly), Decision::Permit);
        assert_eq!(
            evaluate(&s[2], Policy::GuestOnly),
            Decision::Redirect(Route::AdminDashboard)
        );
        assert_eq!(
            evaluate(&s[3], Policy::GuestOnly),
            Decision::Redirect(Route::StudentDashboard)
        );
    }

    #[test]
    fn role_restricted() {
        let s = states();
        let admin = Policy::Require(Role::Admin);
        let student = Policy::Require(Role::Student);

        assert_eq!(evaluate(&s[0], admin), Decision::Wait);
        assert_eq!(evaluate(&s[1], admin), Decision::Redirect(Route::Login));
        assert_eq!(evaluate(&s[1], student), Decision::Redirect(Route::Login));
        assert_eq!(evaluate(&s[2], admin), Decision::Permit);
        assert_eq!(evaluate(&s[2], student), Decision::Redirect(Route::AdminDashboard));
        assert_eq!(evaluate(&s[3], student), Decision::Permit);
        assert_eq!(evaluate(&s[3], admin), Decision::Redirect(Route::StudentDashboard));
    }

    #[test]
    fn evaluation_is_idempotent() {
        for state in states().iter() {
            for r in ROUTES.iter() {
                let before = state.clone();
                let first = evaluate(state, r.policy());
                let second = evaluate(state, r.policy());
                assert_eq!(first, second);
                assert_eq!(&before, state);
            }
        }
    }

    #[test]
    fn mismatch_never_goes_to_login() {
        for state in states().iter().skip(2) {
            for r in ROUTES.iter() {
                assert_ne!(evaluate(state, r.policy()), Decision::Redirect(Route::Login));
            }
        }
    }
}
