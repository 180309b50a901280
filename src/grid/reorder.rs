//! Drag reordering: gesture state machine plus the insertion-point math.
//!
//! ```text
//! mouse:  Idle ──down──▶ Dragging ──up/cancel──▶ Idle (save live order)
//! touch:  Idle ──down──▶ PendingGesture
//!                          ├─ moved past threshold first ─▶ Dragging
//!                          ├─ long-press timer first ─────▶ ContextMenuOpen ──dismiss──▶ Idle
//!                          └─ released early ─────────────▶ Idle (tap)
//! ```
//!
//! While dragging, the live order of the visible cells is updated on every
//! move, the same way the page moves the DOM node. Dropping (or losing the
//! pointer) hands that live order to [`GridState::reorder`].
//!
//! [`GridState::reorder`]: crate::grid::state::GridState::reorder

use serde::Serialize;
use std::cell::RefCell;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Bounding box of a rendered cell, as reported by `getBoundingClientRect`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CellRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

/// Parse `x,y,w,h;x,y,w,h;...` as sent by the page. Returns `None` if any
/// rect is malformed.
pub fn parse_cell_rects(raw: &str) -> Option<Vec<CellRect>> {
    if raw.trim().is_empty() {
        return Some(Vec::new());
    }
    raw.split(';')
        .map(|quad| {
            let nums: Vec<f64> = quad
                .split(',')
                .map(|n| n.trim().parse::<f64>())
                .collect::<Result<_, _>>()
                .ok()?;
            match nums.as_slice() {
                [x, y, w, h] => Some(CellRect::new(*x, *y, *w, *h)),
                _ => None,
            }
        })
        .collect()
}

/// Insertion index (0..=cells.len()) for a pointer over a wrapped grid.
///
/// Cells are first grouped into rows by vertical position and the row whose
/// centre is closest to the pointer wins. Inside that row the horizontally
/// closest cell decides: left of its centre inserts before it, right of it
/// inserts after it. `cells` must be in display order.
pub fn nearest_insertion_point(pointer: Point, cells: &[CellRect]) -> usize {
    if cells.is_empty() {
        return 0;
    }

    let mut by_top: Vec<usize> = (0..cells.len()).collect();
    by_top.sort_by(|&a, &b| cells[a].center_y().total_cmp(&cells[b].center_y()));

    // Cells whose centres sit within half a cell height of the row's first
    // cell belong to the same row.
    let mut rows: Vec<Vec<usize>> = Vec::new();
    for idx in by_top {
        let joins_last = rows.last().is_some_and(|row| {
            let anchor = &cells[row[0]];
            (cells[idx].center_y() - anchor.center_y()).abs() <= anchor.height / 2.0
        });
        match rows.last_mut() {
            Some(row) if joins_last => row.push(idx),
            _ => rows.push(vec![idx]),
        }
    }

    let row_center = |row: &[usize]| {
        row.iter().map(|&i| cells[i].center_y()).sum::<f64>() / row.len() as f64
    };
    let mut best_row = &rows[0];
    let mut best_dy = f64::INFINITY;
    for row in &rows {
        let dy = (pointer.y - row_center(row.as_slice())).abs();
        if dy < best_dy {
            best_dy = dy;
            best_row = row;
        }
    }

    let mut best = best_row[0];
    let mut best_dx = f64::INFINITY;
    for &i in best_row {
        let dx = (pointer.x - cells[i].center_x()).abs();
        if dx < best_dx {
            best_dx = dx;
            best = i;
        }
    }

    if pointer.x < cells[best].center_x() {
        best
    } else {
        best + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
}

impl PointerKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "touch" | "pen" => PointerKind::Touch,
            _ => PointerKind::Mouse,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureState {
    Idle,
    /// Touch down, not yet a drag, tap or long press.
    PendingGesture {
        id: String,
        origin: Point,
        started_ms: f64,
        order: Vec<String>,
    },
    /// `order` is the live order of the visible cells.
    Dragging { id: String, order: Vec<String> },
    ContextMenuOpen { id: String, at: Point },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GestureOutcome {
    Ignored,
    Pending,
    DragStarted,
    /// The dragged cell moved; the page should mirror `order`.
    Moved { order: Vec<String> },
    Unmoved,
    Tap { id: String },
    ContextMenu { id: String, at: Point },
    /// The drag ended; `order` must be saved.
    Dropped { order: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct ReorderController {
    state: GestureState,
    threshold_px: f64,
    long_press_ms: f64,
    enabled: bool,
}

impl ReorderController {
    pub fn new(threshold_px: f64, long_press_ms: f64) -> Self {
        Self {
            state: GestureState::Idle,
            threshold_px,
            long_press_ms,
            enabled: true,
        }
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == GestureState::Idle
    }

    /// Read-only snapshots turn reordering off entirely.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.state = GestureState::Idle;
        }
    }

    pub fn set_timing(&mut self, threshold_px: f64, long_press_ms: f64) {
        self.threshold_px = threshold_px;
        self.long_press_ms = long_press_ms;
    }

    /// Pointer pressed on cell `id`. `visible` is the displayed order.
    pub fn pointer_down(
        &mut self,
        id: &str,
        kind: PointerKind,
        at: Point,
        now_ms: f64,
        visible: &[String],
    ) -> GestureOutcome {
        if !self.enabled || !self.is_idle() || !visible.iter().any(|v| v == id) {
            debug!(id, "Drag source ignored");
            return GestureOutcome::Ignored;
        }
        match kind {
            PointerKind::Mouse => {
                self.state = GestureState::Dragging {
                    id: id.to_string(),
                    order: visible.to_vec(),
                };
                GestureOutcome::DragStarted
            }
            PointerKind::Touch => {
                self.state = GestureState::PendingGesture {
                    id: id.to_string(),
                    origin: at,
                    started_ms: now_ms,
                    order: visible.to_vec(),
                };
                GestureOutcome::Pending
            }
        }
    }

    /// Pointer moved. `cells` are the rects of the other visible cells, in
    /// live order (the dragged cell excluded).
    pub fn pointer_move(&mut self, at: Point, now_ms: f64, cells: &[CellRect]) -> GestureOutcome {
        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        let (next, outcome) = match state {
            GestureState::PendingGesture {
                id,
                origin,
                started_ms,
                order,
            } => {
                if now_ms - started_ms >= self.long_press_ms {
                    (
                        GestureState::ContextMenuOpen { id: id.clone(), at: origin },
                        GestureOutcome::ContextMenu { id, at: origin },
                    )
                } else if at.distance(origin) > self.threshold_px {
                    (GestureState::Dragging { id, order }, GestureOutcome::DragStarted)
                } else {
                    (
                        GestureState::PendingGesture {
                            id,
                            origin,
                            started_ms,
                            order,
                        },
                        GestureOutcome::Pending,
                    )
                }
            }
            GestureState::Dragging { id, order } => {
                let mut others: Vec<String> = order.iter().filter(|o| **o != id).cloned().collect();
                if others.len() != cells.len() {
                    warn!(
                        expected = others.len(),
                        got = cells.len(),
                        "Cell rect count does not match visible cells"
                    );
                    (GestureState::Dragging { id, order }, GestureOutcome::Unmoved)
                } else {
                    let idx = nearest_insertion_point(at, cells);
                    others.insert(idx, id.clone());
                    if others == order {
                        (GestureState::Dragging { id, order }, GestureOutcome::Unmoved)
                    } else {
                        let outcome = GestureOutcome::Moved {
                            order: others.clone(),
                        };
                        (GestureState::Dragging { id, order: others }, outcome)
                    }
                }
            }
            other => (other, GestureOutcome::Ignored),
        };
        self.state = next;
        outcome
    }

    /// Long-press timer callback.
    pub fn long_press_elapsed(&mut self, now_ms: f64) -> GestureOutcome {
        match &self.state {
            GestureState::PendingGesture {
                id,
                origin,
                started_ms,
                ..
            } if now_ms - started_ms >= self.long_press_ms => {
                let (id, at) = (id.clone(), *origin);
                self.state = GestureState::ContextMenuOpen { id: id.clone(), at };
                GestureOutcome::ContextMenu { id, at }
            }
            _ => GestureOutcome::Ignored,
        }
    }

    /// Pointer released.
    pub fn pointer_up(&mut self) -> GestureOutcome {
        match std::mem::replace(&mut self.state, GestureState::Idle) {
            GestureState::PendingGesture { id, .. } => GestureOutcome::Tap { id },
            GestureState::Dragging { order, .. } => GestureOutcome::Dropped { order },
            menu @ GestureState::ContextMenuOpen { .. } => {
                // The menu outlives the touch that opened it.
                self.state = menu;
                GestureOutcome::Ignored
            }
            GestureState::Idle => GestureOutcome::Ignored,
        }
    }

    /// Pointer capture lost or drag aborted. A drag still reports its live
    /// order, since the page has already moved the cells.
    pub fn cancel(&mut self) -> GestureOutcome {
        match std::mem::replace(&mut self.state, GestureState::Idle) {
            GestureState::Dragging { order, .. } => GestureOutcome::Dropped { order },
            _ => GestureOutcome::Ignored,
        }
    }

    pub fn dismiss_menu(&mut self) -> GestureOutcome {
        if matches!(self.state, GestureState::ContextMenuOpen { .. }) {
            self.state = GestureState::Idle;
        }
        GestureOutcome::Ignored
    }
}

impl Default for ReorderController {
    fn default() -> Self {
        Self::new(10.0, 500.0)
    }
}

thread_local! {
    static CONTROLLER: RefCell<ReorderController> = RefCell::new(ReorderController::default());
}

/// Execute a closure with mutable access to the reorder controller.
pub fn with_controller_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut ReorderController) -> R,
{
    CONTROLLER.with(|c| f(&mut c.borrow_mut()))
}

pub fn reset_controller() {
    CONTROLLER.with(|c| *c.borrow_mut() = ReorderController::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// A `cols`-wide grid of 100x100 cells with 10px gaps, `n` cells total.
    fn grid_rects(n: usize, cols: usize) -> Vec<CellRect> {
        (0..n)
            .map(|i| {
                let (row, col) = (i / cols, i % cols);
                CellRect::new(col as f64 * 110.0, row as f64 * 110.0, 100.0, 100.0)
            })
            .collect()
    }

    #[test]
    fn empty_grid_inserts_at_zero() {
        assert_eq!(nearest_insertion_point(Point::new(50.0, 50.0), &[]), 0);
    }

    #[test]
    fn left_half_inserts_before_right_half_after() {
        let cells = grid_rects(3, 3);
        assert_eq!(nearest_insertion_point(Point::new(10.0, 50.0), &cells), 0);
        assert_eq!(nearest_insertion_point(Point::new(90.0, 50.0), &cells), 1);
        assert_eq!(nearest_insertion_point(Point::new(300.0, 50.0), &cells), 3);
    }

    #[test]
    fn picks_row_before_column() {
        // Two rows of three. Far left, just below the row gap: inserts
        // before the first cell of row 2, not at the end of row 1.
        let cells = grid_rects(6, 3);
        let at = Point::new(5.0, 112.0);
        assert_eq!(nearest_insertion_point(at, &cells), 3);
        // Right end of row 1 inserts after its last cell.
        assert_eq!(nearest_insertion_point(Point::new(320.0, 40.0), &cells), 3);
        // Far right of row 2.
        assert_eq!(nearest_insertion_point(Point::new(320.0, 160.0), &cells), 6);
    }

    #[test]
    fn parses_rect_lists() {
        let rects = parse_cell_rects("0,0,100,100; 110,0,100,100").unwrap();
        assert_eq!(rects.len(), 2);
        assert_eq!(rects[1].x, 110.0);
        assert!(parse_cell_rects("1,2,3").is_none());
        assert!(parse_cell_rects("a,b,c,d").is_none());
        assert!(parse_cell_rects("").unwrap().is_empty());
    }

    #[test]
    fn mouse_drag_moves_and_drops() {
        let visible = ids(&["a", "c", "d"]);
        let mut ctl = ReorderController::new(10.0, 500.0);
        assert_eq!(
            ctl.pointer_down("d", PointerKind::Mouse, Point::new(0.0, 0.0), 0.0, &visible),
            GestureOutcome::DragStarted
        );
        // Other cells: a, c in one row. Pointer over a's left half.
        let others = grid_rects(2, 4);
        let outcome = ctl.pointer_move(Point::new(5.0, 50.0), 16.0, &others);
        assert_eq!(
            outcome,
            GestureOutcome::Moved {
                order: ids(&["d", "a", "c"])
            }
        );
        // Same spot again: nothing moves.
        assert_eq!(ctl.pointer_move(Point::new(5.0, 50.0), 32.0, &others), GestureOutcome::Unmoved);
        assert_eq!(
            ctl.pointer_up(),
            GestureOutcome::Dropped {
                order: ids(&["d", "a", "c"])
            }
        );
        assert!(ctl.is_idle());
    }

    #[test]
    fn invalid_source_is_ignored() {
        let mut ctl = ReorderController::default();
        let outcome = ctl.pointer_down("zz", PointerKind::Mouse, Point::new(0.0, 0.0), 0.0, &ids(&["a"]));
        assert_eq!(outcome, GestureOutcome::Ignored);
        assert!(ctl.is_idle());
    }

    #[test]
    fn disabled_controller_ignores_everything() {
        let mut ctl = ReorderController::default();
        ctl.set_enabled(false);
        let outcome = ctl.pointer_down("a", PointerKind::Mouse, Point::new(0.0, 0.0), 0.0, &ids(&["a"]));
        assert_eq!(outcome, GestureOutcome::Ignored);
    }

    #[test]
    fn touch_moving_past_threshold_starts_drag() {
        let mut ctl = ReorderController::new(10.0, 500.0);
        ctl.pointer_down("a", PointerKind::Touch, Point::new(0.0, 0.0), 0.0, &ids(&["a", "b"]));
        assert_eq!(ctl.pointer_move(Point::new(3.0, 4.0), 50.0, &[]), GestureOutcome::Pending);
        assert_eq!(ctl.pointer_move(Point::new(30.0, 0.0), 100.0, &[]), GestureOutcome::DragStarted);
        // Timer firing after the drag started changes nothing.
        assert_eq!(ctl.long_press_elapsed(600.0), GestureOutcome::Ignored);
        assert!(matches!(ctl.state(), GestureState::Dragging { .. }));
    }

    #[test]
    fn touch_long_press_opens_menu_and_blocks_drag() {
        let mut ctl = ReorderController::new(10.0, 500.0);
        ctl.pointer_down("b", PointerKind::Touch, Point::new(5.0, 5.0), 0.0, &ids(&["a", "b"]));
        assert_eq!(ctl.long_press_elapsed(200.0), GestureOutcome::Ignored);
        assert_eq!(
            ctl.long_press_elapsed(500.0),
            GestureOutcome::ContextMenu {
                id: "b".into(),
                at: Point::new(5.0, 5.0)
            }
        );
        assert_eq!(ctl.pointer_move(Point::new(80.0, 80.0), 550.0, &[]), GestureOutcome::Ignored);
        assert_eq!(ctl.pointer_up(), GestureOutcome::Ignored);
        assert!(matches!(ctl.state(), GestureState::ContextMenuOpen { .. }));
        ctl.dismiss_menu();
        assert!(ctl.is_idle());
    }

    #[test]
    fn late_move_resolves_as_long_press() {
        // Timer callback never arrived, but the hold already exceeded it.
        let mut ctl = ReorderController::new(10.0, 500.0);
        ctl.pointer_down("a", PointerKind::Touch, Point::new(0.0, 0.0), 0.0, &ids(&["a"]));
        let outcome = ctl.pointer_move(Point::new(50.0, 0.0), 700.0, &[]);
        assert!(matches!(outcome, GestureOutcome::ContextMenu { .. }));
    }

    #[test]
    fn quick_release_is_a_tap() {
        let mut ctl = ReorderController::default();
        ctl.pointer_down("a", PointerKind::Touch, Point::new(0.0, 0.0), 0.0, &ids(&["a"]));
        assert_eq!(ctl.pointer_up(), GestureOutcome::Tap { id: "a".into() });
        assert!(ctl.is_idle());
    }

    #[test]
    fn cancel_mid_drag_still_reports_live_order() {
        let mut ctl = ReorderController::default();
        ctl.pointer_down("c", PointerKind::Mouse, Point::new(0.0, 0.0), 0.0, &ids(&["a", "b", "c"]));
        ctl.pointer_move(Point::new(5.0, 50.0), 16.0, &grid_rects(2, 4));
        assert_eq!(
            ctl.cancel(),
            GestureOutcome::Dropped {
                order: ids(&["c", "a", "b"])
            }
        );
        assert!(ctl.is_idle());
        assert_eq!(ctl.cancel(), GestureOutcome::Ignored);
    }

    #[test]
    fn second_pointer_is_ignored_while_dragging() {
        let mut ctl = ReorderController::default();
        let visible = ids(&["a", "b"]);
        ctl.pointer_down("a", PointerKind::Mouse, Point::new(0.0, 0.0), 0.0, &visible);
        assert_eq!(
            ctl.pointer_down("b", PointerKind::Mouse, Point::new(0.0, 0.0), 0.0, &visible),
            GestureOutcome::Ignored
        );
    }

    #[test]
    fn mismatched_rects_do_not_move() {
        let mut ctl = ReorderController::default();
        ctl.pointer_down("a", PointerKind::Mouse, Point::new(0.0, 0.0), 0.0, &ids(&["a", "b", "c"]));
        assert_eq!(ctl.pointer_move(Point::new(0.0, 0.0), 1.0, &grid_rects(5, 5)), GestureOutcome::Unmoved);
    }
}
