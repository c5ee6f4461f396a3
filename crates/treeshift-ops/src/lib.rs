//! Structural reorganization engine for treeshift.
//!
//! Copy, move and delete are planned in three stages: a selection is
//! classified into a policy (or normalized into a delete closure), the
//! destination is validated, and a [`Change`] tree is composed together with
//! the reference updates the operation requires. Confirmations are asked
//! through injected query services so planning also runs headless. Changes
//! are executed separately, synchronously or on a blocking worker with
//! progress reporting via channels.

mod change;
mod composer;
mod delete;
mod destination;
mod error;
mod executor;
mod participants;
mod policy;
mod processor;
mod progress;
mod qualified;
mod query;
mod references;
mod replay;
mod search;
mod selection;
mod undo;

pub use change::{Change, ChangeKind, FolderRef};
pub use composer::{ChangeComposer, ReorgPlan, check_buffers, element_label};
pub use delete::{DeleteClosure, DeleteNormalizer, NamespaceMode, check_delete, delete_change};
pub use destination::ResolvedDestination;
pub use error::{ChangeError, NotApplicable, ReorgError};
pub use executor::{ApplyResult, perform_change, start_apply};
pub use participants::{
    DeltaConsumer, DeltaEntry, DeltaKind, ManifestGuard, Participant, ParticipantFactory,
    ParticipantRegistry, ReorgArguments, ResourceDelta,
};
pub use policy::{PolicyKind, ReorgFlags, ReorgOperation, ReorgPolicy, classify};
pub use processor::ReorgProcessor;
pub use progress::{ApplyComplete, ApplyProgress};
pub use qualified::{QualifiedNameUpdater, QualifiedRename};
pub use query::{
    AutoConfirm, ConfirmAnswer, ConfirmQuery, ConfirmationContext, NewNameQuery, NewNameTarget,
    NullQueries, QueryKind, Question, ScriptedQueries, StaticNewName, decision_key, suggest_name,
};
pub use references::{
    ImportRewrite, ImportRewrites, MoveReferenceUpdater, ReferenceUpdate, TextChangeSet,
    namespace_declaration_edit, with_namespace_declaration,
};
pub use replay::{Decision, DescriptorOperation, RecordedDecisions, ReorgDescriptor, ResolvedDescriptor};
pub use search::{
    MatchAccuracy, ReferenceForm, SearchEngine, SearchMatch, TextSearchEngine, TypeReference, Visibility,
};
pub use selection::{Selection, common_parent, remove_descendants};
pub use undo::{UndoEntry, UndoLog};

/// Default channel buffer size for execution progress updates.
pub const OPERATION_CHANNEL_SIZE: usize = 100;
