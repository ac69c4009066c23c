//! Composite surfaces: several devices addressed as one larger display.
//!
//! Devices are placed relative to the most recently placed one:
//!
//! ```ignore
//! let grid = GridBuilder::new(a)   // a
//!     .right(b)                    // a b
//!     .bottom(c)                   // a b
//!                                  //   c
//!     .build()?;
//! assert_eq!((grid.width(), grid.height()), (16, 16));
//! ```
//!
//! Every placement shifts the existing layout by one device in the opposite
//! direction and puts the new device at the origin. `build` then translates
//! the layout so the top-left segment sits at `(0, 0)`. Layouts need not be
//! rectangular; pixels in a gap are unaddressable.

use std::collections::HashSet;
use std::future::Future;

use futures::future::join_all;

use crate::codec::{Color, MATRIX_LEN, MATRIX_SIDE};
use crate::error::{L8Error, Result};
use crate::session::DeviceSession;

const SIDE: i64 = MATRIX_SIDE as i64;

/// How a grid operation reaches the devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// Resolve one segment from grid coordinates and call it with local ones.
    PerCoordinate,
    /// Split a full-grid matrix into one 64-pixel matrix per segment.
    PerMatrix,
    /// Send the same command to every segment.
    Broadcast,
}

/// Operations a grid forwards to its devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridOperation {
    SetLed,
    ClearLed,
    SetMatrix,
    ClearGrid,
    SetSuperLed,
    StopApplication,
}

/// Every grid operation with the way it is dispatched.
pub const DISPATCH_TABLE: &[(GridOperation, DispatchStrategy)] = &[
    (GridOperation::SetLed, DispatchStrategy::PerCoordinate),
    (GridOperation::ClearLed, DispatchStrategy::PerCoordinate),
    (GridOperation::SetMatrix, DispatchStrategy::PerMatrix),
    (GridOperation::ClearGrid, DispatchStrategy::Broadcast),
    (GridOperation::SetSuperLed, DispatchStrategy::Broadcast),
    (GridOperation::StopApplication, DispatchStrategy::Broadcast),
];

impl GridOperation {
    /// Method name on [`Grid`].
    pub fn name(self) -> &'static str {
        match self {
            GridOperation::SetLed => "set_led",
            GridOperation::ClearLed => "clear_led",
            GridOperation::SetMatrix => "set_matrix",
            GridOperation::ClearGrid => "clear_grid",
            GridOperation::SetSuperLed => "set_super_led",
            GridOperation::StopApplication => "stop_application",
        }
    }

    /// Dispatch strategy from [`DISPATCH_TABLE`].
    pub fn strategy(self) -> DispatchStrategy {
        DISPATCH_TABLE
            .iter()
            .find(|(op, _)| *op == self)
            .map(|(_, strategy)| *strategy)
            // Unreachable: every variant has a row.
            .unwrap_or(DispatchStrategy::Broadcast)
    }
}

/// One device's placement. `position` is the grid pixel of its top-left LED.
#[derive(Clone)]
pub struct GridSegment {
    pub position: (usize, usize),
    pub device: DeviceSession,
}

impl GridSegment {
    fn contains(&self, x: usize, y: usize) -> bool {
        let (sx, sy) = self.position;
        (sx..sx + MATRIX_SIDE).contains(&x) && (sy..sy + MATRIX_SIDE).contains(&y)
    }
}

impl std::fmt::Debug for GridSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridSegment")
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

/// A grid pixel resolved to its device.
#[derive(Debug, Clone, Copy)]
pub struct MappedPixel<'a> {
    pub segment: &'a GridSegment,
    pub x: usize,
    pub y: usize,
}

/// Builder for a [`Grid`].
pub struct GridBuilder {
    placed: Vec<((i64, i64), DeviceSession)>,
}

impl GridBuilder {
    /// Start a layout with `device` at the origin.
    pub fn new(device: DeviceSession) -> Self {
        Self {
            placed: vec![((0, 0), device)],
        }
    }

    fn place(mut self, dx: i64, dy: i64, device: DeviceSession) -> Self {
        for ((x, y), _) in &mut self.placed {
            *x += dx;
            *y += dy;
        }
        self.placed.push(((0, 0), device));
        self
    }

    /// Place `device` left of the last placed device.
    pub fn left(self, device: DeviceSession) -> Self {
        self.place(SIDE, 0, device)
    }

    /// Place `device` right of the last placed device.
    pub fn right(self, device: DeviceSession) -> Self {
        self.place(-SIDE, 0, device)
    }

    /// Place `device` above the last placed device.
    pub fn top(self, device: DeviceSession) -> Self {
        self.place(0, SIDE, device)
    }

    /// Place `device` below the last placed device.
    pub fn bottom(self, device: DeviceSession) -> Self {
        self.place(0, -SIDE, device)
    }

    /// Normalize the layout and build the grid.
    ///
    /// Fails if two devices occupy the same place.
    pub fn build(self) -> Result<Grid> {
        let min_x = self.placed.iter().map(|((x, _), _)| *x).min().unwrap_or(0);
        let min_y = self.placed.iter().map(|((_, y), _)| *y).min().unwrap_or(0);

        let mut seen = HashSet::new();
        let mut segments = Vec::with_capacity(self.placed.len());
        for ((x, y), device) in self.placed {
            let position = ((x - min_x) as usize, (y - min_y) as usize);
            if !seen.insert(position) {
                return Err(L8Error::validation(format!(
                    "two devices placed at {:?}",
                    position
                )));
            }
            segments.push(GridSegment { position, device });
        }

        let width = segments.iter().map(|s| s.position.0).max().unwrap_or(0) + MATRIX_SIDE;
        let height = segments.iter().map(|s| s.position.1).max().unwrap_or(0) + MATRIX_SIDE;

        tracing::debug!("Grid of {} devices, {}x{}", segments.len(), width, height);
        Ok(Grid {
            segments,
            width,
            height,
        })
    }
}

/// Several devices forming one addressable surface.
#[derive(Debug, Clone)]
pub struct Grid {
    segments: Vec<GridSegment>,
    width: usize,
    height: usize,
}

impl Grid {
    /// Width of the bounding box in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of the bounding box in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Segments in placement order.
    pub fn segments(&self) -> &[GridSegment] {
        &self.segments
    }

    /// Resolve a grid pixel to a device and local coordinates.
    pub fn map_coordinates(&self, x: usize, y: usize) -> Result<MappedPixel<'_>> {
        let segment = self
            .segments
            .iter()
            .find(|s| s.contains(x, y))
            .ok_or_else(|| {
                L8Error::validation(format!("({}, {}) is not covered by any device", x, y))
            })?;
        Ok(MappedPixel {
            segment,
            x: x - segment.position.0,
            y: y - segment.position.1,
        })
    }

    /// Devices an operation reaches, chosen by its [`DispatchStrategy`].
    ///
    /// `PerCoordinate` needs `at` and yields one device with local
    /// coordinates. The other strategies yield every segment in placement
    /// order.
    fn route(
        &self,
        operation: GridOperation,
        at: Option<(usize, usize)>,
    ) -> Result<Vec<MappedPixel<'_>>> {
        let strategy = operation.strategy();
        tracing::trace!("Grid {} ({:?})", operation.name(), strategy);

        match strategy {
            DispatchStrategy::PerCoordinate => {
                let (x, y) = at.ok_or_else(|| {
                    L8Error::validation(format!("{} needs a coordinate", operation.name()))
                })?;
                Ok(vec![self.map_coordinates(x, y)?])
            }
            DispatchStrategy::PerMatrix | DispatchStrategy::Broadcast => Ok(self
                .segments
                .iter()
                .map(|segment| MappedPixel { segment, x: 0, y: 0 })
                .collect()),
        }
    }

    /// Set one grid pixel.
    pub async fn set_led(&self, x: usize, y: usize, color: &Color) -> Result<()> {
        let targets = self.route(GridOperation::SetLed, Some((x, y)))?;
        settle_all(
            targets
                .iter()
                .map(|t| t.segment.device.set_led(t.x, t.y, color)),
        )
        .await
    }

    /// Turn one grid pixel off.
    pub async fn clear_led(&self, x: usize, y: usize) -> Result<()> {
        let targets = self.route(GridOperation::ClearLed, Some((x, y)))?;
        settle_all(targets.iter().map(|t| t.segment.device.clear_led(t.x, t.y))).await
    }

    /// Split a row-major matrix `columns` pixels wide across the devices.
    ///
    /// Pixels falling in a gap are dropped and pixels not given are black.
    /// All devices are written concurrently; the call returns once every
    /// device has answered, with the first error if any failed. Devices that
    /// succeeded keep the new image.
    pub async fn set_matrix(&self, colors: &[Color], columns: usize) -> Result<()> {
        let targets = self.route(GridOperation::SetMatrix, None)?;
        let parts = self.partition(colors, columns)?;
        settle_all(
            targets
                .iter()
                .zip(parts)
                .map(|(t, part)| async move { t.segment.device.set_matrix(&part).await }),
        )
        .await
    }

    fn partition(&self, colors: &[Color], columns: usize) -> Result<Vec<Vec<Color>>> {
        if columns == 0 || colors.len() % columns != 0 {
            return Err(L8Error::validation(format!(
                "{} pixels do not form rows of {}",
                colors.len(),
                columns
            )));
        }
        let rows = colors.len() / columns;
        if columns > self.width || rows > self.height {
            return Err(L8Error::validation(format!(
                "{}x{} matrix exceeds the {}x{} grid",
                columns, rows, self.width, self.height
            )));
        }

        let mut parts = vec![vec![Color::BLACK; MATRIX_LEN]; self.segments.len()];
        for (index, color) in colors.iter().enumerate() {
            let (x, y) = (index % columns, index / columns);
            if let Some(i) = self.segments.iter().position(|s| s.contains(x, y)) {
                let (sx, sy) = self.segments[i].position;
                parts[i][(y - sy) * MATRIX_SIDE + (x - sx)] = *color;
            }
        }
        Ok(parts)
    }

    /// Turn every device's matrix off.
    pub async fn clear_grid(&self) -> Result<()> {
        let targets = self.route(GridOperation::ClearGrid, None)?;
        settle_all(targets.iter().map(|t| t.segment.device.clear_matrix())).await
    }

    /// Set every device's status LED.
    pub async fn set_super_led(&self, color: &Color) -> Result<()> {
        let targets = self.route(GridOperation::SetSuperLed, None)?;
        settle_all(targets.iter().map(|t| t.segment.device.set_super_led(color))).await
    }

    /// Stop the running application on every device.
    pub async fn stop_application(&self) -> Result<()> {
        let targets = self.route(GridOperation::StopApplication, None)?;
        settle_all(targets.iter().map(|t| t.segment.device.stop_application())).await
    }
}

/// Run every branch to completion, then report the first failure.
async fn settle_all<I, F>(branches: I) -> Result<()>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<()>>,
{
    join_all(branches).await.into_iter().collect()
}
