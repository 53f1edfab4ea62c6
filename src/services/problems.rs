use jiff::Timestamp;
use thiserror::Error;
use tracing::info;

use crate::{
    backend::{Backend, BackendError, Request},
    models::{
        RecordId,
        problem::{Problem, ProblemCategory},
        record::{Record, RecordKind},
        store::{RECORD_LIMIT, Store},
        user::User,
    },
    policy,
    services::refresh,
};

#[derive(Debug, Error)]
pub enum ReportProblemError {
    #[error("Describe the problem in the message")]
    EmptyMessage,

    #[error("The sheet already holds {limit} problem reports", limit = RECORD_LIMIT)]
    LimitReached,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct ReportProblemParameters {
    pub category: ProblemCategory,
    pub message: String,
}

pub fn report_problem(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: ReportProblemParameters,
) -> Result<Problem, ReportProblemError> {
    let message = parameters.message.trim();
    if message.is_empty() {
        return Err(ReportProblemError::EmptyMessage);
    }
    refresh(store, backend)?;
    if store.is_full(RecordKind::Problem) {
        return Err(ReportProblemError::LimitReached);
    }

    let now = Timestamp::now();
    let problem = Problem {
        id: store.next_id(now),
        category: parameters.category,
        message: message.to_string(),
        reporter: actor.id.clone(),
        created_at: now,
    };

    backend.submit(&Request::create(&Record::Problem(problem.clone())))?;
    refresh(store, backend)?;
    info!(problem = %problem.id, category = %problem.category, "problem reported");

    Ok(problem)
}

#[derive(Debug, Error)]
pub enum DeleteProblemError {
    #[error("Problem report '{0}' not found")]
    NotFound(String),

    #[error("Only the reporter, the director or the admin can delete report '{0}'")]
    NotPermitted(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct DeleteProblemParameters {
    pub problem_id: String,
}

pub fn check_delete_problem<'a>(
    store: &'a Store,
    actor: &User,
    problem_id: &str,
) -> Result<&'a Problem, DeleteProblemError> {
    let problem = store
        .get_problem(&RecordId::new(problem_id.trim()))
        .ok_or_else(|| DeleteProblemError::NotFound(problem_id.to_string()))?;
    if !policy::can_delete_problem(actor, problem) {
        return Err(DeleteProblemError::NotPermitted(problem.id.to_string()));
    }
    Ok(problem)
}

pub fn delete_problem(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: DeleteProblemParameters,
) -> Result<Problem, DeleteProblemError> {
    refresh(store, backend)?;
    let problem = check_delete_problem(store, actor, &parameters.problem_id)?.clone();

    backend.submit(&Request::delete(RecordKind::Problem, problem.id.clone()))?;
    refresh(store, backend)?;
    info!(problem = %problem.id, "problem report deleted");

    Ok(problem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::testing::sheet_with,
        views::{
            self,
            fixtures::{school, user},
        },
    };

    #[test]
    fn test_reported_problem_is_visible_to_reporter_and_director() {
        let (backend, mut store, dir) = sheet_with(school().records());
        let teacher = user("tb", "teacher_budget");

        let problem = report_problem(
            &mut store,
            &backend,
            &teacher,
            ReportProblemParameters {
                category: ProblemCategory::Equipment,
                message: "Projector in room 3 is broken".to_string(),
            },
        )
        .unwrap();

        let own: Vec<_> = views::visible_problems(&store, &teacher)
            .into_iter()
            .map(|p| p.id.clone())
            .collect();
        assert!(own.contains(&problem.id));
        assert_eq!(own.len(), 2);
        assert_eq!(
            views::visible_problems(&store, &user("dir", "director")).len(),
            3
        );
        assert!(
            !views::visible_problems(&store, &user("ta", "teacher_academic"))
                .iter()
                .any(|p| p.id == problem.id)
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_empty_message_is_rejected() {
        let (backend, mut store, dir) = sheet_with(&[]);
        assert!(matches!(
            report_problem(
                &mut store,
                &backend,
                &user("tb", "teacher_budget"),
                ReportProblemParameters {
                    category: ProblemCategory::Other,
                    message: " ".to_string(),
                },
            ),
            Err(ReportProblemError::EmptyMessage)
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_delete_problem_rights() {
        let (backend, mut store, dir) = sheet_with(school().records());
        let parameters = || DeleteProblemParameters {
            problem_id: "p1".to_string(),
        };

        assert!(matches!(
            delete_problem(&mut store, &backend, &user("ta", "teacher_academic"), parameters()),
            Err(DeleteProblemError::NotPermitted(_))
        ));
        delete_problem(&mut store, &backend, &user("tb", "teacher_budget"), parameters()).unwrap();
        assert!(store.get_problem(&"p1".into()).is_none());
        std::fs::remove_dir_all(dir).unwrap();
    }
}
