use crate::domain::error::Result;
use crate::domain::match_result::{MatchResult, RequestContext};
use async_trait::async_trait;

/// Maps a natural-language question to one of a role's query types.
///
/// `Ok(None)` means the matcher has no opinion. `Err` is a failure of the
/// matcher itself; the dispatcher decides whether the next matcher may try.
#[async_trait]
pub trait Matcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_match(
        &self,
        query: &str,
        role: &str,
        ctx: &RequestContext,
    ) -> Result<Option<MatchResult>>;
}
