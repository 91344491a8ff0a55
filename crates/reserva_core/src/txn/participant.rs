//! Transaction outcome notification.

use crate::error::CoreResult;
use crate::types::Xid;

/// A party that must learn a transaction's outcome.
///
/// Implemented by every resource node (restore or discard its undo log) and
/// by the coordinator's customer store. Implementations backed by a network
/// report delivery failures as [`crate::CoreError::Communication`]; the
/// transaction manager logs those and moves on — delivery is at-most-once by
/// design.
pub trait Participant: Send + Sync {
    /// The participant's logical name, used in logs and participant sets.
    fn participant_name(&self) -> &str;

    /// The transaction committed; discard its undo state.
    fn commit(&self, xid: Xid) -> CoreResult<()>;

    /// The transaction aborted; restore its before-images.
    fn abort(&self, xid: Xid) -> CoreResult<()>;
}
