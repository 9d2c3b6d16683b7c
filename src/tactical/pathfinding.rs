//! A* pathfinding across subcells
//!
//! Respects terrain costs, preferred terrain, forbidden command cells and
//! impassable water. Results are identical across runs: frontier ties break
//! by (f, row, column).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ahash::{AHashMap, AHashSet};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tactical::constants::DIAGONAL_STEP;
use crate::tactical::grid::{CommandCell, SubcellCoord, TerrainGrid};
use crate::tactical::terrain::{TerrainTable, TerrainType};

const ORTHOGONAL: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
const DIAGONAL: [(i32, i32); 4] = [(-1, -1), (1, -1), (-1, 1), (1, 1)];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("no route for leg {leg}")]
    NoRoute { leg: usize },

    #[error("route endpoint {0:?} is off the map")]
    OutOfBounds(SubcellCoord),
}

/// Per-terrain step cost after applying preference bias
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostTable {
    costs: [Option<f32>; 5],
}

impl CostTable {
    /// Terrain multipliers with `bias` applied to preferred types
    pub fn new(table: &TerrainTable, prefer: &[TerrainType], bias: f32) -> Self {
        let mut costs = [None; 5];
        for (i, terrain) in TerrainType::ALL.iter().enumerate() {
            costs[i] = table.move_cost(*terrain).map(|cost| {
                if prefer.contains(terrain) {
                    cost * bias
                } else {
                    cost
                }
            });
        }
        Self { costs }
    }

    fn slot(terrain: TerrainType) -> usize {
        TerrainType::ALL
            .iter()
            .position(|t| *t == terrain)
            .unwrap_or_default()
    }

    pub fn cost(&self, terrain: TerrainType) -> Option<f32> {
        self.costs[Self::slot(terrain)]
    }

    /// Cheapest step cost; scales the heuristic so it stays admissible
    pub fn min_cost(&self) -> f32 {
        self.costs
            .iter()
            .flatten()
            .copied()
            .fold(f32::INFINITY, f32::min)
    }
}

/// Everything the pathfinder needs for one unit's route
#[derive(Debug, Clone)]
pub struct PathRequest {
    pub start: SubcellCoord,
    pub destinations: Vec<SubcellCoord>,
    pub costs: CostTable,
    pub forbidden_cells: AHashSet<CommandCell>,
    /// Individual subcells that may not be entered (e.g. enemy-occupied)
    pub forbidden_subcells: AHashSet<SubcellCoord>,
    pub diagonal: bool,
}

impl PathRequest {
    pub fn new(start: SubcellCoord, destinations: Vec<SubcellCoord>, costs: CostTable) -> Self {
        Self {
            start,
            destinations,
            costs,
            forbidden_cells: AHashSet::new(),
            forbidden_subcells: AHashSet::new(),
            diagonal: true,
        }
    }

    pub fn forbid_cells(mut self, cells: impl IntoIterator<Item = CommandCell>) -> Self {
        self.forbidden_cells.extend(cells);
        self
    }

    pub fn forbid_subcells(mut self, subcells: impl IntoIterator<Item = SubcellCoord>) -> Self {
        self.forbidden_subcells.extend(subcells);
        self
    }

    pub fn with_diagonal(mut self, diagonal: bool) -> Self {
        self.diagonal = diagonal;
        self
    }
}

/// A resolved route through every requested destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Subcells from start (index 0) to the final destination
    pub points: Vec<SubcellCoord>,
    /// Index into `points` at which each destination is reached
    pub leg_ends: Vec<usize>,
    pub cost: f32,
}

impl Route {
    pub fn destination(&self) -> Option<SubcellCoord> {
        self.points.last().copied()
    }
}

/// Walkability view shared by every leg of one request
struct Search<'a> {
    grid: &'a TerrainGrid,
    request: &'a PathRequest,
    /// The start's own command cell is exempt from the forbidden set so a unit
    /// inside an avoided cell can still leave it.
    exempt_cell: Option<CommandCell>,
}

impl<'a> Search<'a> {
    fn step_cost(&self, coord: SubcellCoord) -> Option<f32> {
        let terrain = self.grid.terrain_at(coord)?;
        let cost = self.request.costs.cost(terrain)?;
        if self.request.forbidden_subcells.contains(&coord) {
            return None;
        }
        let cell = self.grid.cell_of(coord)?;
        if Some(cell) != self.exempt_cell && self.request.forbidden_cells.contains(&cell) {
            return None;
        }
        Some(cost)
    }

    fn neighbors(&self, coord: SubcellCoord) -> Vec<(SubcellCoord, f32)> {
        let mut result = Vec::with_capacity(8);
        for (dx, dy) in ORTHOGONAL {
            let next = coord.offset(dx, dy);
            if let Some(cost) = self.step_cost(next) {
                result.push((next, cost));
            }
        }
        if self.request.diagonal {
            for (dx, dy) in DIAGONAL {
                let next = coord.offset(dx, dy);
                // No corner cutting between two blocked orthogonals
                let side_a = self.step_cost(coord.offset(dx, 0)).is_some();
                let side_b = self.step_cost(coord.offset(0, dy)).is_some();
                if !side_a && !side_b {
                    continue;
                }
                if let Some(cost) = self.step_cost(next) {
                    result.push((next, cost * DIAGONAL_STEP));
                }
            }
        }
        result
    }

    fn heuristic(&self, from: SubcellCoord, goal: SubcellCoord, min_cost: f32) -> f32 {
        if self.request.diagonal {
            from.octile_distance(&goal) * min_cost
        } else {
            from.manhattan_distance(&goal) as f32 * min_cost
        }
    }

    /// A* for one leg. Returns the path (start included) and its cost.
    fn leg(&self, start: SubcellCoord, goal: SubcellCoord) -> Option<(Vec<SubcellCoord>, f32)> {
        if start == goal {
            return Some((vec![start], 0.0));
        }
        // The goal must be enterable
        self.step_cost(goal)?;

        let min_cost = self.request.costs.min_cost();
        if !min_cost.is_finite() {
            return None;
        }

        let mut open_set = BinaryHeap::new();
        let mut came_from: AHashMap<SubcellCoord, SubcellCoord> = AHashMap::new();
        let mut g_scores: AHashMap<SubcellCoord, f32> = AHashMap::new();
        let mut closed: AHashSet<SubcellCoord> = AHashSet::new();

        g_scores.insert(start, 0.0);
        open_set.push(Reverse((
            OrderedFloat(self.heuristic(start, goal, min_cost)),
            start,
        )));

        while let Some(Reverse((_, current))) = open_set.pop() {
            if current == goal {
                let cost = g_scores.get(&goal).copied().unwrap_or(f32::INFINITY);
                return Some((reconstruct_path(&came_from, current), cost));
            }
            if !closed.insert(current) {
                continue;
            }

            let current_g = g_scores.get(&current).copied().unwrap_or(f32::INFINITY);

            for (neighbor, step) in self.neighbors(current) {
                if closed.contains(&neighbor) {
                    continue;
                }
                let tentative_g = current_g + step;
                let neighbor_g = g_scores.get(&neighbor).copied().unwrap_or(f32::INFINITY);

                if tentative_g < neighbor_g {
                    came_from.insert(neighbor, current);
                    g_scores.insert(neighbor, tentative_g);
                    let f_cost = tentative_g + self.heuristic(neighbor, goal, min_cost);
                    open_set.push(Reverse((OrderedFloat(f_cost), neighbor)));
                }
            }
        }

        None
    }
}

/// Find a route from `request.start` through each destination in order
pub fn find_route(grid: &TerrainGrid, request: &PathRequest) -> Result<Route, PathError> {
    if !grid.in_bounds(request.start) {
        return Err(PathError::OutOfBounds(request.start));
    }
    if let Some(bad) = request.destinations.iter().find(|d| !grid.in_bounds(**d)) {
        return Err(PathError::OutOfBounds(*bad));
    }

    let search = Search {
        grid,
        request,
        exempt_cell: grid.cell_of(request.start),
    };

    let mut points = vec![request.start];
    let mut leg_ends = Vec::with_capacity(request.destinations.len());
    let mut total = 0.0;
    let mut leg_start = request.start;

    for (leg, goal) in request.destinations.iter().enumerate() {
        let Some((path, cost)) = search.leg(leg_start, *goal) else {
            tracing::trace!(leg, from = ?leg_start, to = ?goal, "no route");
            return Err(PathError::NoRoute { leg });
        };
        points.extend(path.into_iter().skip(1));
        leg_ends.push(points.len() - 1);
        total += cost;
        leg_start = *goal;
    }

    Ok(Route {
        points,
        leg_ends,
        cost: total,
    })
}

/// Reconstruct path from came_from map
fn reconstruct_path(
    came_from: &AHashMap<SubcellCoord, SubcellCoord>,
    mut current: SubcellCoord,
) -> Vec<SubcellCoord> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

/// Cost of an arbitrary route under a cost table, or None if any step is illegal
pub fn route_cost(grid: &TerrainGrid, costs: &CostTable, points: &[SubcellCoord]) -> Option<f32> {
    let mut total = 0.0;
    for pair in points.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        if (from.x - to.x).abs() > 1 || (from.y - to.y).abs() > 1 {
            return None;
        }
        let cost = costs.cost(grid.terrain_at(to)?)?;
        total += if from.is_diagonal_to(&to) {
            cost * DIAGONAL_STEP
        } else {
            cost
        };
    }
    Some(total)
}
