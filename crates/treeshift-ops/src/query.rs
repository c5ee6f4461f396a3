//! Confirmation and new-name queries.
//!
//! Queries block the calling operation until answered. Every answer is
//! recorded under the question's key so the same operation can later be
//! replayed without interaction.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use strum::Display;
use treeshift_core::{Element, Workspace};

use crate::replay::{Decision, RecordedDecisions};

/// Answer to a yes/yes-to-all/no/no-to-all question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmAnswer {
    Yes,
    YesToAll,
    No,
    NoToAll,
}

impl ConfirmAnswer {
    /// Check if this answer applies to all remaining questions of its kind.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::YesToAll | Self::NoToAll)
    }

    /// Convert a global answer to its single-question equivalent.
    pub fn to_single(&self) -> Self {
        match self {
            Self::YesToAll => Self::Yes,
            Self::NoToAll => Self::No,
            _ => *self,
        }
    }

    pub fn accepted(&self) -> bool {
        matches!(self, Self::Yes | Self::YesToAll)
    }
}

/// What a confirmation is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum QueryKind {
    /// Deleting a folder that contains a source root.
    SourceRootFolder,
    /// Deleting an archive referenced by other projects.
    ReferencedArchive,
    /// Deleting a read-only element.
    ReadOnly,
    /// Deleting the accessors of a deleted field.
    Accessors,
    /// Replacing a same-named element at the destination.
    Overwrite,
    /// Deleting a linked parent folder.
    LinkedFolder,
    /// Creating a destination namespace that does not exist.
    CreateTarget,
}

/// A question asked during an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub kind: QueryKind,
    pub message: String,
    pub element: Option<Element>,
    /// Id-independent key used to record and replay the answer.
    pub key: String,
}

impl Question {
    /// Question about a workspace element.
    pub fn about(ws: &Workspace, kind: QueryKind, element: Element, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            element: Some(element),
            key: decision_key(ws, &kind.to_string(), element),
        }
    }
}

/// Key of a recorded decision: `<kind>:<handle>`.
pub fn decision_key(ws: &Workspace, kind: &str, element: Element) -> String {
    match ws.handle_for(element) {
        Some(handle) => format!("{kind}:{handle}"),
        None => format!("{kind}:{element:?}"),
    }
}

/// Confirmation service.
pub trait ConfirmQuery {
    /// Plain yes/no question.
    fn confirm(&mut self, question: &Question) -> bool;

    /// Question that may be answered for all remaining questions of its kind.
    fn confirm_all(&mut self, question: &Question) -> ConfirmAnswer;
}

/// Kind of element a new name is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum NewNameTarget {
    Resource,
    SourceUnit,
    Namespace,
    SourceRoot,
}

/// New-name service for copies whose destination already holds a same-named
/// element. `None` skips the element.
pub trait NewNameQuery {
    fn new_name(&mut self, target: NewNameTarget, original: &str, suggestion: &str) -> Option<String>;
}

/// Headless provider: declines everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullQueries;

impl ConfirmQuery for NullQueries {
    fn confirm(&mut self, _question: &Question) -> bool {
        false
    }

    fn confirm_all(&mut self, _question: &Question) -> ConfirmAnswer {
        ConfirmAnswer::No
    }
}

impl NewNameQuery for NullQueries {
    fn new_name(&mut self, _target: NewNameTarget, _original: &str, _suggestion: &str) -> Option<String> {
        None
    }
}

/// Headless provider: accepts everything, including suggested names.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl ConfirmQuery for AutoConfirm {
    fn confirm(&mut self, _question: &Question) -> bool {
        true
    }

    fn confirm_all(&mut self, _question: &Question) -> ConfirmAnswer {
        ConfirmAnswer::YesToAll
    }
}

impl NewNameQuery for AutoConfirm {
    fn new_name(&mut self, _target: NewNameTarget, _original: &str, suggestion: &str) -> Option<String> {
        Some(suggestion.to_string())
    }
}

/// Always answers with a fixed name.
#[derive(Debug, Clone, Default)]
pub struct StaticNewName(pub Option<String>);

impl NewNameQuery for StaticNewName {
    fn new_name(&mut self, _target: NewNameTarget, _original: &str, _suggestion: &str) -> Option<String> {
        self.0.clone()
    }
}

/// Answers taken from a per-kind script. Unscripted questions are declined.
#[derive(Debug, Clone, Default)]
pub struct ScriptedQueries {
    answers: HashMap<QueryKind, VecDeque<ConfirmAnswer>>,
    /// Every question asked, in order.
    pub asked: Vec<Question>,
}

impl ScriptedQueries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the next question of `kind`.
    pub fn answer(mut self, kind: QueryKind, answer: ConfirmAnswer) -> Self {
        self.answers.entry(kind).or_default().push_back(answer);
        self
    }

    fn next(&mut self, question: &Question) -> ConfirmAnswer {
        self.asked.push(question.clone());
        self.answers
            .get_mut(&question.kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ConfirmAnswer::No)
    }
}

impl ConfirmQuery for ScriptedQueries {
    fn confirm(&mut self, question: &Question) -> bool {
        self.next(question).accepted()
    }

    fn confirm_all(&mut self, question: &Question) -> ConfirmAnswer {
        self.next(question)
    }
}

/// Propose a free name for a copy of `original`.
///
/// Source units become `CopyOfA.java`, `Copy2OfA.java`; namespaces and
/// source roots get a `_copy` suffix; other resources follow the
/// `name (1).ext` pattern.
pub fn suggest_name(target: NewNameTarget, original: &str, taken: impl Fn(&str) -> bool) -> String {
    let candidate = |i: usize| -> String {
        match target {
            NewNameTarget::SourceUnit if i == 1 => format!("CopyOf{original}"),
            NewNameTarget::SourceUnit => format!("Copy{i}Of{original}"),
            NewNameTarget::Namespace | NewNameTarget::SourceRoot if i == 1 => format!("{original}_copy"),
            NewNameTarget::Namespace | NewNameTarget::SourceRoot => format!("{original}_copy{i}"),
            NewNameTarget::Resource => match original.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({i}).{ext}"),
                _ => format!("{original} ({i})"),
            },
        }
    };

    (1..1000)
        .map(candidate)
        .find(|name| !taken(name))
        .unwrap_or_else(|| candidate(1000))
}

/// Confirmation state threaded through one operation.
///
/// Answers come from the replay decisions when present, otherwise from the
/// query services. Global answers stick for the rest of the operation.
pub struct ConfirmationContext<'a> {
    queries: &'a mut dyn ConfirmQuery,
    names: &'a mut dyn NewNameQuery,
    replay: Option<&'a RecordedDecisions>,
    recorded: RecordedDecisions,
    sticky: HashMap<QueryKind, bool>,
}

impl<'a> ConfirmationContext<'a> {
    pub fn new(queries: &'a mut dyn ConfirmQuery, names: &'a mut dyn NewNameQuery) -> Self {
        Self {
            queries,
            names,
            replay: None,
            recorded: RecordedDecisions::default(),
            sticky: HashMap::new(),
        }
    }

    /// Answer from previously recorded decisions where possible.
    pub fn with_replay(mut self, decisions: &'a RecordedDecisions) -> Self {
        self.replay = Some(decisions);
        self
    }

    fn replayed(&self, key: &str) -> Option<&Decision> {
        self.replay.and_then(|d| d.get(key))
    }

    /// Ask a plain yes/no question.
    pub fn confirm(&mut self, question: &Question) -> bool {
        let answer = match self.replayed(&question.key) {
            Some(Decision::Confirm { answer }) => *answer,
            _ => {
                if self.queries.confirm(question) {
                    ConfirmAnswer::Yes
                } else {
                    ConfirmAnswer::No
                }
            }
        };
        self.recorded
            .insert(question.key.clone(), Decision::Confirm { answer });
        answer.accepted()
    }

    /// Ask a question that may be answered for all of its kind.
    pub fn confirm_all(&mut self, question: &Question) -> bool {
        if let Some(accepted) = self.sticky.get(&question.kind) {
            return *accepted;
        }
        let answer = match self.replayed(&question.key) {
            Some(Decision::Confirm { answer }) => answer.to_single(),
            _ => self.queries.confirm_all(question),
        };
        if answer.is_global() {
            self.sticky.insert(question.kind, answer.accepted());
        }
        self.recorded.insert(
            question.key.clone(),
            Decision::Confirm {
                answer: answer.to_single(),
            },
        );
        answer.accepted()
    }

    /// Ask for the name of a copy. `None` skips the element.
    pub fn new_name(
        &mut self,
        key: String,
        target: NewNameTarget,
        original: &str,
        suggestion: &str,
    ) -> Option<String> {
        let name = match self.replayed(&key) {
            Some(Decision::NewName { name }) => name.clone(),
            _ => self.names.new_name(target, original, suggestion),
        };
        self.recorded
            .insert(key, Decision::NewName { name: name.clone() });
        name
    }

    /// Whether a missing destination may be created.
    pub fn create_target(&mut self, question: &Question) -> bool {
        let allow = match self.replayed(&question.key) {
            Some(Decision::CreateTarget { allow }) => *allow,
            _ => self.queries.confirm(question),
        };
        self.recorded
            .insert(question.key.clone(), Decision::CreateTarget { allow });
        allow
    }

    /// Decisions made so far.
    pub fn decisions(&self) -> &RecordedDecisions {
        &self.recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(kind: QueryKind, key: &str) -> Question {
        Question {
            kind,
            message: "delete?".to_string(),
            element: None,
            key: key.to_string(),
        }
    }

    #[test]
    fn test_answer_helpers() {
        assert!(ConfirmAnswer::YesToAll.is_global());
        assert_eq!(ConfirmAnswer::NoToAll.to_single(), ConfirmAnswer::No);
        assert!(ConfirmAnswer::Yes.accepted());
        assert!(!ConfirmAnswer::NoToAll.accepted());
        assert_eq!(ConfirmAnswer::YesToAll.to_string(), "yes-to-all");
    }

    #[test]
    fn test_null_queries_decline() {
        let mut queries = NullQueries;
        let mut names = NullQueries;
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);
        assert!(!ctx.confirm(&question(QueryKind::ReadOnly, "a")));
        assert!(!ctx.confirm_all(&question(QueryKind::Accessors, "b")));
        assert_eq!(ctx.new_name("c".into(), NewNameTarget::Resource, "a.txt", "a (1).txt"), None);
        assert_eq!(ctx.decisions().len(), 3);
    }

    #[test]
    fn test_global_answers_stick() {
        let mut queries = ScriptedQueries::new().answer(QueryKind::Accessors, ConfirmAnswer::YesToAll);
        let mut names = NullQueries;
        {
            let mut ctx = ConfirmationContext::new(&mut queries, &mut names);
            assert!(ctx.confirm_all(&question(QueryKind::Accessors, "f")));
            assert!(ctx.confirm_all(&question(QueryKind::Accessors, "g")));
            // Other kinds are unaffected and fall back to no.
            assert!(!ctx.confirm_all(&question(QueryKind::Overwrite, "h")));
        }
        assert_eq!(queries.asked.len(), 2);
    }

    #[test]
    fn test_replay_answers_without_asking() {
        let mut decisions = RecordedDecisions::default();
        decisions.insert(
            "overwrite:x".to_string(),
            Decision::Confirm {
                answer: ConfirmAnswer::Yes,
            },
        );
        decisions.insert(
            "new-name:y".to_string(),
            Decision::NewName {
                name: Some("Other.java".to_string()),
            },
        );

        let mut queries = ScriptedQueries::new();
        let mut names = StaticNewName(None);
        {
            let mut ctx = ConfirmationContext::new(&mut queries, &mut names).with_replay(&decisions);
            assert!(ctx.confirm_all(&question(QueryKind::Overwrite, "overwrite:x")));
            assert_eq!(
                ctx.new_name("new-name:y".into(), NewNameTarget::SourceUnit, "A.java", "CopyOfA.java"),
                Some("Other.java".to_string())
            );
        }
        assert!(queries.asked.is_empty());
    }

    #[test]
    fn test_create_target_is_asked_and_recorded() {
        let mut decisions = RecordedDecisions::default();
        decisions.insert(
            "create-target:ns:app/src:r".to_string(),
            Decision::CreateTarget { allow: false },
        );
        let mut queries = ScriptedQueries::new().answer(QueryKind::CreateTarget, ConfirmAnswer::Yes);
        let mut names = NullQueries;
        {
            let mut ctx = ConfirmationContext::new(&mut queries, &mut names).with_replay(&decisions);
            assert!(!ctx.create_target(&question(QueryKind::CreateTarget, "create-target:ns:app/src:r")));
            assert!(ctx.create_target(&question(QueryKind::CreateTarget, "create-target:ns:app/src:s")));
            assert_eq!(
                ctx.decisions().get("create-target:ns:app/src:s"),
                Some(&Decision::CreateTarget { allow: true })
            );
        }
        assert_eq!(queries.asked.len(), 1);
    }

    #[test]
    fn test_suggest_name() {
        let taken = |name: &str| matches!(name, "CopyOfA.java" | "notes (1).txt" | "p_copy");
        assert_eq!(suggest_name(NewNameTarget::SourceUnit, "A.java", taken), "Copy2OfA.java");
        assert_eq!(suggest_name(NewNameTarget::Resource, "notes.txt", taken), "notes (2).txt");
        assert_eq!(suggest_name(NewNameTarget::Namespace, "p", taken), "p_copy2");
        assert_eq!(suggest_name(NewNameTarget::Resource, "Makefile", |_| false), "Makefile (1)");
    }
}
