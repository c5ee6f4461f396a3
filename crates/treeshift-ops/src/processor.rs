//! Entry point tying classification, normalization and composition together.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use treeshift_core::{Element, RefactoringStatus, ReorgConfig, Workspace};

use crate::composer::{ChangeComposer, ReorgPlan, element_label};
use crate::delete::{DeleteNormalizer, check_delete};
use crate::error::{NotApplicable, ReorgError};
use crate::participants::{DeltaConsumer, ParticipantRegistry};
use crate::policy::{ReorgFlags, ReorgOperation, ReorgPolicy, classify};
use crate::query::ConfirmationContext;
use crate::replay::{DescriptorOperation, ReorgDescriptor};
use crate::search::{SearchEngine, TextSearchEngine};
use crate::selection::Selection;

/// Plans move, copy and delete operations on a workspace.
pub struct ReorgProcessor {
    config: ReorgConfig,
    search: Box<dyn SearchEngine>,
    participants: ParticipantRegistry,
    consumers: Vec<Box<dyn DeltaConsumer>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ReorgProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReorgProcessor")
            .field("config", &self.config)
            .field("participants", &self.participants)
            .field("consumers", &self.consumers.len())
            .finish()
    }
}

impl ReorgProcessor {
    pub fn new(config: ReorgConfig) -> Self {
        Self {
            config,
            search: Box::new(TextSearchEngine),
            participants: ParticipantRegistry::new(),
            consumers: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_search(mut self, search: Box<dyn SearchEngine>) -> Self {
        self.search = search;
        self
    }

    pub fn with_participants(mut self, participants: ParticipantRegistry) -> Self {
        self.participants = participants;
        self
    }

    pub fn with_consumer(mut self, consumer: Box<dyn DeltaConsumer>) -> Self {
        self.consumers.push(consumer);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ReorgConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn flags(&self) -> ReorgFlags {
        ReorgFlags::from(&self.config)
    }

    fn composer<'a>(&'a self, ws: &'a Workspace) -> ChangeComposer<'a> {
        ChangeComposer::new(
            ws,
            &self.config,
            self.search.as_ref(),
            &self.participants,
            &self.consumers,
            &self.cancel,
        )
    }

    /// Pick the policy for a copy or move.
    pub fn classify(
        &self,
        ws: &Workspace,
        selection: &Selection,
        operation: ReorgOperation,
    ) -> Result<ReorgPolicy, NotApplicable> {
        classify(ws, selection, operation, self.flags())
    }

    pub fn plan_move(
        &self,
        ws: &Workspace,
        selection: &Selection,
        destination: Element,
        confirmations: &mut ConfirmationContext<'_>,
    ) -> Result<ReorgPlan, ReorgError> {
        self.plan_reorg(ws, selection, ReorgOperation::Move, destination, confirmations)
    }

    pub fn plan_copy(
        &self,
        ws: &Workspace,
        selection: &Selection,
        destination: Element,
        confirmations: &mut ConfirmationContext<'_>,
    ) -> Result<ReorgPlan, ReorgError> {
        self.plan_reorg(ws, selection, ReorgOperation::Copy, destination, confirmations)
    }

    #[instrument(skip_all, fields(operation = ?operation, elements = selection.len()))]
    fn plan_reorg(
        &self,
        ws: &Workspace,
        selection: &Selection,
        operation: ReorgOperation,
        destination: Element,
        confirmations: &mut ConfirmationContext<'_>,
    ) -> Result<ReorgPlan, ReorgError> {
        let mut policy = self.classify(ws, selection, operation)?;
        info!(kind = %policy.kind, "Classified selection");

        let stale = stale_status(ws, policy.selection.elements().chain([destination]));
        if stale.has_fatal() {
            return Ok(ReorgPlan::rejected(format!("{operation:?}"), stale));
        }

        let status = policy.set_destination(ws, destination);
        if status.has_fatal() {
            let description = format!("{operation:?} to '{}'", element_label(ws, destination));
            return Ok(ReorgPlan::rejected(description, status));
        }

        let mut plan = self.composer(ws).compose_reorg(&policy, confirmations)?;
        plan.decisions = confirmations.decisions().clone();
        Ok(plan)
    }

    #[instrument(skip_all, fields(elements = selection.len()))]
    pub fn plan_delete(
        &self,
        ws: &Workspace,
        selection: &Selection,
        confirmations: &mut ConfirmationContext<'_>,
    ) -> Result<ReorgPlan, ReorgError> {
        check_delete(ws, selection)?;
        let stale = stale_status(ws, selection.elements());
        if stale.has_fatal() {
            return Ok(ReorgPlan::rejected("Delete", stale));
        }

        let closure = DeleteNormalizer::new(ws, self.flags(), confirmations, &self.cancel).normalize(selection)?;
        let mut plan = self.composer(ws).compose_delete(&closure)?;
        plan.decisions = confirmations.decisions().clone();
        Ok(plan)
    }

    /// Resolve a descriptor against `ws` and plan it. A missing destination
    /// namespace is created in `ws` when `confirmations` allow it.
    pub fn plan_descriptor(
        &self,
        ws: &mut Workspace,
        descriptor: &ReorgDescriptor,
        confirmations: &mut ConfirmationContext<'_>,
    ) -> Result<ReorgPlan, ReorgError> {
        let resolved = descriptor.resolve(ws, confirmations)?;
        let ws = &*ws;
        match (descriptor.operation, resolved.destination) {
            (DescriptorOperation::Delete, _) => self.plan_delete(ws, &resolved.selection, confirmations),
            (DescriptorOperation::Move, Some(destination)) => {
                self.plan_move(ws, &resolved.selection, destination, confirmations)
            }
            (DescriptorOperation::Copy, Some(destination)) => {
                self.plan_copy(ws, &resolved.selection, destination, confirmations)
            }
            (operation, None) => Ok(ReorgPlan::rejected(
                operation.to_string(),
                RefactoringStatus::fatal("The descriptor has no destination"),
            )),
        }
    }
}

/// Fatal entries for elements that vanished since they were selected.
fn stale_status(ws: &Workspace, elements: impl IntoIterator<Item = Element>) -> RefactoringStatus {
    let mut status = RefactoringStatus::new();
    for element in elements {
        if !ws.element_exists(element) {
            status.add_fatal(format!("{element:?} no longer exists"));
        } else if let Element::Resource(id) = element {
            if !ws.is_accessible(id) {
                status.add(
                    treeshift_core::Severity::Fatal,
                    format!("'{}' is not accessible", ws.resource_path(id).display()),
                    Some(element),
                );
            }
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{AutoConfirm, NullQueries};
    use treeshift_core::Severity;

    fn workspace() -> Workspace {
        let mut ws = Workspace::new();
        ws.build(|ws| {
            let app = ws.add_project("app").unwrap();
            let src = ws.create_folder(app, "src").unwrap();
            ws.add_source_root(src, false, vec![]).unwrap();
            let p = ws.add_folders(src, "p").unwrap();
            ws.add_folders(src, "q").unwrap();
            ws.add_file(p, "A.java", "package p;\n\nclass A {\n}\n").unwrap();
            ws.add_file(app, "a.txt", "text").unwrap();
        });
        ws
    }

    #[test]
    fn test_move_into_own_folder_is_fatal() {
        let ws = workspace();
        let file = ws.find_resource("app/a.txt").unwrap();
        let app = ws.find_resource("app").unwrap();
        let (mut queries, mut names) = (AutoConfirm, AutoConfirm);
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);

        let plan = ReorgProcessor::new(ReorgConfig::default())
            .plan_move(&ws, &Selection::from_resources([file]), Element::Resource(app), &mut ctx)
            .unwrap();
        assert!(plan.status.has_fatal());
        assert!(!plan.is_executable());
    }

    #[test]
    fn test_inaccessible_destination_is_stale() {
        let mut ws = workspace();
        let file = ws.find_resource("app/a.txt").unwrap();
        let q = ws.find_resource("app/src/q").unwrap();
        ws.set_accessible(q, false);
        let (mut queries, mut names) = (NullQueries, NullQueries);
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);

        let plan = ReorgProcessor::new(ReorgConfig::default())
            .plan_copy(&ws, &Selection::from_resources([file]), Element::Resource(q), &mut ctx)
            .unwrap();
        assert_eq!(plan.status.severity(), Severity::Fatal);
    }

    #[test]
    fn test_cancelled_processor() {
        let ws = workspace();
        let a = ws.find_resource("app/src/p/A.java").unwrap();
        let unit = ws.symbol_for_resource(a).unwrap();
        let q = ws.namespace_for_folder(ws.find_resource("app/src/q").unwrap()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (mut queries, mut names) = (AutoConfirm, AutoConfirm);
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);

        let result = ReorgProcessor::new(ReorgConfig::default())
            .with_cancel(cancel)
            .plan_move(&ws, &Selection::from_symbols([unit]), Element::Symbol(q), &mut ctx);
        assert!(matches!(result, Err(ReorgError::Cancelled)));
    }

    #[test]
    fn test_delete_unavailable_for_root() {
        let ws = workspace();
        let (mut queries, mut names) = (NullQueries, NullQueries);
        let mut ctx = ConfirmationContext::new(&mut queries, &mut names);
        let result = ReorgProcessor::new(ReorgConfig::default()).plan_delete(&ws, &Selection::new(), &mut ctx);
        assert!(matches!(result, Err(ReorgError::NotApplicable(NotApplicable::Empty))));
    }
}
