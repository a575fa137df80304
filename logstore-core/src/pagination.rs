//! Pagination engine (spec §4.2, component C2): a generic forward/backward page fetch
//! that composes with the cursor codec (C1) and a driver-supplied fetch closure. This
//! is backend-agnostic — every driver's `list_event`/`list_attempt` calls [`paginate`]
//! with its own row type and its own async fetch closure.

use std::future::Future;

use crate::cursor;
use crate::errors::StoreError;
use crate::model::{ListResult, Page, SortOrder};

/// The comparison operator the driver must apply to the cursor condition, derived
/// from scan direction and requested sort order (spec §4.2 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Gt,
}

fn reverse(order: SortOrder) -> SortOrder {
    match order {
        SortOrder::Asc => SortOrder::Desc,
        SortOrder::Desc => SortOrder::Asc,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CameIn {
    First,
    Next,
    Prev,
}

/// Run the generic pagination algorithm (spec §4.2 steps 1–7).
///
/// - `resource_tag` scopes cursor validation (spec §4.2, e.g. `cursor::EVENT_TAG`).
/// - `position_of` extracts a row's sort-key position string (spec's `"<ms>::<id>"`
///   recommendation, produced via [`crate::cursor::encode_position`]).
/// - `fetch` is the driver-supplied closure, receiving `(scan_dir, cursor_condition,
///   limit + 1)` and returning up to that many rows in `scan_dir` order.
pub async fn paginate<T, F, Fut>(
    resource_tag: &str,
    sort_order: SortOrder,
    page: &Page,
    limit: usize,
    position_of: impl Fn(&T) -> String,
    fetch: F,
) -> Result<ListResult<T>, StoreError>
where
    F: FnOnce(SortOrder, Option<(CompareOp, String)>, usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, StoreError>>,
{
    let limit = crate::model::clamp_limit(limit);

    let (came_in, cursor_pos) = match page {
        Page::First => (CameIn::First, None),
        Page::Next(token) => (CameIn::Next, Some(cursor::decode(token, resource_tag)?)),
        Page::Prev(token) => (CameIn::Prev, Some(cursor::decode(token, resource_tag)?)),
    };

    let backward = came_in == CameIn::Prev;
    let scan_dir = if backward { reverse(sort_order) } else { sort_order };

    // forward-desc => Lt, forward-asc => Gt, backward-desc => Gt, backward-asc => Lt
    let compare_op = match (backward, sort_order) {
        (false, SortOrder::Desc) => CompareOp::Lt,
        (false, SortOrder::Asc) => CompareOp::Gt,
        (true, SortOrder::Desc) => CompareOp::Gt,
        (true, SortOrder::Asc) => CompareOp::Lt,
    };
    let cursor_condition = cursor_pos.map(|pos| (compare_op, pos));

    let mut rows = fetch(scan_dir, cursor_condition, limit + 1).await?;
    let has_more = rows.len() > limit;
    if has_more {
        rows.truncate(limit);
    }
    if backward {
        rows.reverse();
    }

    let emit_next = !rows.is_empty()
        && match came_in {
            CameIn::First | CameIn::Next => has_more,
            CameIn::Prev => true,
        };
    let emit_prev = !rows.is_empty()
        && match came_in {
            CameIn::First => false,
            CameIn::Next => true,
            CameIn::Prev => has_more,
        };

    let next = emit_next.then(|| cursor::encode(resource_tag, &position_of(rows.last().unwrap())));
    let prev = emit_prev.then(|| cursor::encode(resource_tag, &position_of(rows.first().unwrap())));

    Ok(ListResult {
        items: rows,
        next,
        prev,
    })
}
