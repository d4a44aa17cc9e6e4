//! Node classification for the cavity grid.
//!
//! Host mode distinguishes only fluid, no-slip walls and the moving lid.
//! Accelerator mode names every piece of the boundary shell by its position
//! so device kernels can dispatch on it directly. Both are produced by the
//! same ordered rule table walk: the first matching rule wins, and nodes no
//! rule matches are fluid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::grid::Grid;

/// Which execution path a run uses. Fixed for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Host,
    Accelerator,
}

/// Boundary faces, excluding their edges and corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    Top = 3,
    Bottom = 4,
    Left = 5,
    Right = 6,
    Back = 7,
    Front = 8,
}

/// Boundary edges, excluding their corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    LeftBottom = 9,
    RightBottom = 10,
    BackBottom = 11,
    FrontBottom = 12,
    LeftBack = 13,
    LeftFront = 14,
    RightBack = 15,
    RightFront = 16,
    LeftUpper = 17,
    RightUpper = 18,
    BackUpper = 19,
    FrontUpper = 20,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    LeftBottomBack = 21,
    LeftBottomFront = 22,
    LeftUpperBack = 23,
    LeftUpperFront = 24,
    RightBottomBack = 25,
    RightBottomFront = 26,
    RightUpperBack = 27,
    RightUpperFront = 28,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Top, Face::Bottom, Face::Left, Face::Right, Face::Back, Face::Front,
    ];

    fn on_lid(self) -> bool {
        self == Face::Top
    }
}

impl Edge {
    pub const ALL: [Edge; 12] = [
        Edge::LeftBottom, Edge::RightBottom, Edge::BackBottom, Edge::FrontBottom,
        Edge::LeftBack, Edge::LeftFront, Edge::RightBack, Edge::RightFront,
        Edge::LeftUpper, Edge::RightUpper, Edge::BackUpper, Edge::FrontUpper,
    ];

    fn on_lid(self) -> bool {
        matches!(self, Edge::LeftUpper | Edge::RightUpper | Edge::BackUpper | Edge::FrontUpper)
    }
}

impl Corner {
    pub const ALL: [Corner; 8] = [
        Corner::LeftBottomBack, Corner::LeftBottomFront,
        Corner::LeftUpperBack, Corner::LeftUpperFront,
        Corner::RightBottomBack, Corner::RightBottomFront,
        Corner::RightUpperBack, Corner::RightUpperFront,
    ];

    fn on_lid(self) -> bool {
        matches!(
            self,
            Corner::LeftUpperBack | Corner::LeftUpperFront
                | Corner::RightUpperBack | Corner::RightUpperFront
        )
    }
}

/// Category of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellFlag {
    Fluid,
    NoSlip,
    MovingWall,
    Face(Face),
    Edge(Edge),
    Corner(Corner),
}

impl CellFlag {
    /// Stable numeric code, used for device upload and flag dumps.
    pub fn code(self) -> u32 {
        match self {
            CellFlag::Fluid => 0,
            CellFlag::NoSlip => 1,
            CellFlag::MovingWall => 2,
            CellFlag::Face(face) => face as u32,
            CellFlag::Edge(edge) => edge as u32,
            CellFlag::Corner(corner) => corner as u32,
        }
    }

    #[inline]
    pub fn is_fluid(self) -> bool {
        self == CellFlag::Fluid
    }

    /// True for every boundary node lying on the lid plane `y = L + 1`.
    pub fn is_moving_wall(self) -> bool {
        match self {
            CellFlag::MovingWall => true,
            CellFlag::Face(face) => face.on_lid(),
            CellFlag::Edge(edge) => edge.on_lid(),
            CellFlag::Corner(corner) => corner.on_lid(),
            CellFlag::Fluid | CellFlag::NoSlip => false,
        }
    }

    /// Whether this category is part of `mode`'s encoding.
    pub fn belongs_to(self, mode: ExecutionMode) -> bool {
        match self {
            CellFlag::Fluid => true,
            CellFlag::NoSlip | CellFlag::MovingWall => mode == ExecutionMode::Host,
            CellFlag::Face(_) | CellFlag::Edge(_) | CellFlag::Corner(_) => {
                mode == ExecutionMode::Accelerator
            }
        }
    }

    /// Every category of both encodings.
    pub fn all() -> impl Iterator<Item = CellFlag> {
        [CellFlag::Fluid, CellFlag::NoSlip, CellFlag::MovingWall]
            .into_iter()
            .chain(Face::ALL.into_iter().map(CellFlag::Face))
            .chain(Edge::ALL.into_iter().map(CellFlag::Edge))
            .chain(Corner::ALL.into_iter().map(CellFlag::Corner))
    }
}

/// Constraint a rule puts on one coordinate.
#[derive(Debug, Clone, Copy)]
enum Pin {
    Low,
    High,
    Interior,
    Any,
}

impl Pin {
    #[inline]
    fn admits(self, coord: usize, last: usize) -> bool {
        match self {
            Pin::Low => coord == 0,
            Pin::High => coord == last,
            Pin::Interior => coord != 0 && coord != last,
            Pin::Any => true,
        }
    }
}

struct Rule {
    pins: [Pin; 3],
    flag: CellFlag,
}

impl Rule {
    #[inline]
    fn matches(&self, x: usize, y: usize, z: usize, last: usize) -> bool {
        self.pins[0].admits(x, last) && self.pins[1].admits(y, last) && self.pins[2].admits(z, last)
    }
}

const fn rule(x: Pin, y: Pin, z: Pin, flag: CellFlag) -> Rule {
    Rule { pins: [x, y, z], flag }
}

use self::Pin::{Any, High, Interior, Low};

// The lid is tested before the side walls so it owns its edges and corners.
const HOST_RULES: [Rule; 6] = [
    rule(Any, High, Any, CellFlag::MovingWall),
    rule(Low, Any, Any, CellFlag::NoSlip),
    rule(High, Any, Any, CellFlag::NoSlip),
    rule(Any, Low, Any, CellFlag::NoSlip),
    rule(Any, Any, Low, CellFlag::NoSlip),
    rule(Any, Any, High, CellFlag::NoSlip),
];

// Corners, then edges, then faces. Edge rules leave their third axis free and
// rely on the corners having been matched already.
const ACCELERATOR_RULES: [Rule; 26] = [
    rule(Low, Low, Low, CellFlag::Corner(Corner::LeftBottomBack)),
    rule(Low, Low, High, CellFlag::Corner(Corner::LeftBottomFront)),
    rule(Low, High, Low, CellFlag::Corner(Corner::LeftUpperBack)),
    rule(Low, High, High, CellFlag::Corner(Corner::LeftUpperFront)),
    rule(High, Low, Low, CellFlag::Corner(Corner::RightBottomBack)),
    rule(High, Low, High, CellFlag::Corner(Corner::RightBottomFront)),
    rule(High, High, Low, CellFlag::Corner(Corner::RightUpperBack)),
    rule(High, High, High, CellFlag::Corner(Corner::RightUpperFront)),
    rule(Low, Low, Any, CellFlag::Edge(Edge::LeftBottom)),
    rule(High, Low, Any, CellFlag::Edge(Edge::RightBottom)),
    rule(Any, Low, Low, CellFlag::Edge(Edge::BackBottom)),
    rule(Any, Low, High, CellFlag::Edge(Edge::FrontBottom)),
    rule(Low, Any, Low, CellFlag::Edge(Edge::LeftBack)),
    rule(Low, Any, High, CellFlag::Edge(Edge::LeftFront)),
    rule(High, Any, Low, CellFlag::Edge(Edge::RightBack)),
    rule(High, Any, High, CellFlag::Edge(Edge::RightFront)),
    rule(Low, High, Any, CellFlag::Edge(Edge::LeftUpper)),
    rule(High, High, Any, CellFlag::Edge(Edge::RightUpper)),
    rule(Any, High, Low, CellFlag::Edge(Edge::BackUpper)),
    rule(Any, High, High, CellFlag::Edge(Edge::FrontUpper)),
    rule(Interior, High, Interior, CellFlag::Face(Face::Top)),
    rule(Interior, Low, Interior, CellFlag::Face(Face::Bottom)),
    rule(Low, Interior, Interior, CellFlag::Face(Face::Left)),
    rule(High, Interior, Interior, CellFlag::Face(Face::Right)),
    rule(Interior, Interior, Low, CellFlag::Face(Face::Back)),
    rule(Interior, Interior, High, CellFlag::Face(Face::Front)),
];

fn rules(mode: ExecutionMode) -> &'static [Rule] {
    match mode {
        ExecutionMode::Host => &HOST_RULES,
        ExecutionMode::Accelerator => &ACCELERATOR_RULES,
    }
}

/// Category of node `(x, y, z)` under `mode`.
pub fn classify(x: usize, y: usize, z: usize, grid: &Grid, mode: ExecutionMode) -> CellFlag {
    let last = grid.last();
    debug_assert!(x <= last && y <= last && z <= last, "node ({}, {}, {}) outside grid", x, y, z);

    rules(mode)
        .iter()
        .find(|rule| rule.matches(x, y, z, last))
        .map_or(CellFlag::Fluid, |rule| rule.flag)
}

/// One category per node, written once and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagField {
    grid: Grid,
    mode: ExecutionMode,
    flags: Vec<CellFlag>,
}

impl FlagField {
    pub fn classify(grid: Grid, mode: ExecutionMode) -> Result<Self> {
        let mut flags = Vec::new();
        flags
            .try_reserve_exact(grid.node_count())
            .with_context(|| format!("failed to allocate flag field for {} nodes", grid.node_count()))?;

        flags.extend(grid.coordinates().map(|(x, y, z)| classify(x, y, z, &grid, mode)));

        Ok(Self { grid, mode, flags })
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[inline]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    #[inline]
    pub fn get(&self, index: usize) -> CellFlag {
        self.flags[index]
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize, z: usize) -> CellFlag {
        self.flags[self.grid.index(x, y, z)]
    }

    pub fn as_slice(&self) -> &[CellFlag] {
        &self.flags
    }

    /// Numeric codes in storage order
    pub fn codes(&self) -> Vec<u32> {
        self.flags.iter().map(|flag| flag.code()).collect()
    }
}
