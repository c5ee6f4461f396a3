//! Recorded decisions and serializable operation descriptors.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::info;
use treeshift_core::{Element, ElementHandle, ModelError, ReorgConfig, Workspace};

use crate::error::ReorgError;
use crate::policy::ReorgOperation;
use crate::query::{ConfirmAnswer, ConfirmationContext, QueryKind, Question};
use crate::selection::Selection;

/// One answer given during an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Decision {
    Confirm { answer: ConfirmAnswer },
    NewName { name: Option<String> },
    CreateTarget { allow: bool },
}

/// Decisions keyed by `<kind>:<element handle>`, in the order they were made.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordedDecisions(IndexMap<String, Decision>);

impl RecordedDecisions {
    pub fn get(&self, key: &str) -> Option<&Decision> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: String, decision: Decision) {
        self.0.insert(key, decision);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Decision)> {
        self.0.iter()
    }

    pub fn to_json(&self) -> Result<String, ReorgError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ReorgError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Operation named by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DescriptorOperation {
    Move,
    Copy,
    Delete,
}

impl From<ReorgOperation> for DescriptorOperation {
    fn from(operation: ReorgOperation) -> Self {
        match operation {
            ReorgOperation::Copy => Self::Copy,
            ReorgOperation::Move => Self::Move,
        }
    }
}

/// Serializable description of an operation, replayable against a freshly
/// loaded workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorgDescriptor {
    pub operation: DescriptorOperation,
    pub elements: Vec<ElementHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<ElementHandle>,
    #[serde(default)]
    pub config: ReorgConfig,
    #[serde(default)]
    pub decisions: RecordedDecisions,
    pub timestamp: DateTime<Utc>,
}

/// A descriptor resolved against a workspace.
#[derive(Debug, Clone)]
pub struct ResolvedDescriptor {
    pub selection: Selection,
    pub destination: Option<Element>,
}

impl ReorgDescriptor {
    pub fn new(
        operation: DescriptorOperation,
        elements: Vec<ElementHandle>,
        destination: Option<ElementHandle>,
        config: ReorgConfig,
    ) -> Self {
        Self {
            operation,
            elements,
            destination,
            config,
            decisions: RecordedDecisions::default(),
            timestamp: Utc::now(),
        }
    }

    /// Key of the decision allowing a missing destination to be created.
    pub fn create_target_key(handle: &ElementHandle) -> String {
        format!("create-target:{handle}")
    }

    /// Resolve the handles. A missing destination namespace is created when
    /// `confirmations` allow it; the answer is recorded there.
    pub fn resolve(
        &self,
        ws: &mut Workspace,
        confirmations: &mut ConfirmationContext<'_>,
    ) -> Result<ResolvedDescriptor, ReorgError> {
        let elements = self
            .elements
            .iter()
            .map(|h| ws.resolve_handle(h))
            .collect::<Result<Vec<_>, _>>()?;

        let destination = match &self.destination {
            None => None,
            Some(handle) => Some(self.resolve_destination(ws, handle, confirmations)?),
        };

        Ok(ResolvedDescriptor {
            selection: Selection::from_elements(elements),
            destination,
        })
    }

    fn resolve_destination(
        &self,
        ws: &mut Workspace,
        handle: &ElementHandle,
        confirmations: &mut ConfirmationContext<'_>,
    ) -> Result<Element, ReorgError> {
        match (ws.resolve_handle(handle), handle) {
            (Ok(element), _) => Ok(element),
            (Err(ModelError::Unresolved { .. }), ElementHandle::Namespace { root, name })
                if Self::allows_create(confirmations, handle) =>
            {
                let root = ws
                    .resolve_handle(&ElementHandle::SourceRoot(root.clone()))?
                    .as_symbol()
                    .ok_or_else(|| ModelError::Unresolved {
                        handle: handle.to_string(),
                    })?;
                let ns = ws.create_namespace(root, name)?;
                info!(%handle, "Created missing destination namespace");
                Ok(Element::Symbol(ns))
            }
            (Err(e), _) => Err(e.into()),
        }
    }

    fn allows_create(confirmations: &mut ConfirmationContext<'_>, handle: &ElementHandle) -> bool {
        let question = Question {
            kind: QueryKind::CreateTarget,
            message: format!("Destination '{handle}' does not exist. Create it?"),
            element: None,
            key: Self::create_target_key(handle),
        };
        confirmations.create_target(&question)
    }

    pub fn to_json(&self) -> Result<String, ReorgError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ReorgError> {
        Ok(serde_json::from_str(json)?)
    }
}
