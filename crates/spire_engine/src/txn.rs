use spire_common::error::SpireResult;
use spire_common::request_context::RequestContext;
use spire_common::QueryResult;

/// Backend transaction handle the engine dispatches physical queries through.
///
/// Shared by every engine of one execution, including the parallel branches
/// of joins and unions.
pub trait Transaction: Send + Sync {
    fn execute(&self, req: &RequestContext) -> SpireResult<QueryResult>;

    /// Per-transaction ceiling on rows a join may produce.
    fn max_join_rows(&self) -> usize;

    fn set_max_join_rows(&self, max: usize);
}
