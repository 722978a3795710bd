use std::fmt::Display;

/// Half-open pixel rectangle `[col_min, col_max) x [row_min, row_max)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PixelWindow {
    pub col_min: u32,
    pub row_min: u32,
    pub col_max: u32,
    pub row_max: u32,
}

impl PixelWindow {
    pub fn new(col_min: u32, row_min: u32, col_max: u32, row_max: u32) -> Self {
        Self {
            col_min,
            row_min,
            col_max,
            row_max,
        }
    }

    pub fn full(cols: u32, rows: u32) -> Self {
        Self::new(0, 0, cols, rows)
    }

    pub fn width(&self) -> u32 {
        self.col_max.saturating_sub(self.col_min)
    }

    pub fn height(&self) -> u32 {
        self.row_max.saturating_sub(self.row_min)
    }

    pub fn pixel_count(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, other: &PixelWindow) -> bool {
        other.col_min >= self.col_min
            && other.row_min >= self.row_min
            && other.col_max <= self.col_max
            && other.row_max <= self.row_max
    }

    pub fn intersection(&self, other: &PixelWindow) -> Option<PixelWindow> {
        let window = PixelWindow::new(
            self.col_min.max(other.col_min),
            self.row_min.max(other.row_min),
            self.col_max.min(other.col_max),
            self.row_max.min(other.row_max),
        );
        (!window.is_empty()).then_some(window)
    }
}

impl Display for PixelWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}..{}, {}..{}]",
            self.col_min, self.col_max, self.row_min, self.row_max
        )
    }
}

/// Splits a raster into square-ish windows no larger than a byte budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowPlanner {
    max_tile_size: Option<u64>,
}

impl WindowPlanner {
    pub fn new(max_tile_size: Option<u64>) -> Self {
        Self { max_tile_size }
    }

    pub fn max_tile_size(&self) -> Option<u64> {
        self.max_tile_size
    }

    /// Longest window edge whose square fits the budget, `None` when
    /// unbounded or when not even one pixel fits.
    pub fn edge(&self, bytes_per_pixel: u64) -> Option<u32> {
        let max = self.max_tile_size?;
        let pixels = max / bytes_per_pixel.max(1);
        let mut side = (pixels as f64).sqrt() as u64;
        // correct float rounding at perfect squares
        while (side + 1) * (side + 1) <= pixels {
            side += 1;
        }
        while side * side > pixels {
            side -= 1;
        }
        (side > 0).then_some(side.min(u32::MAX as u64) as u32)
    }

    /// Row-major windows covering `cols x rows`, last row and column shrunk to fit.
    pub fn plan(&self, cols: u32, rows: u32, bytes_per_pixel: u64) -> Vec<PixelWindow> {
        match self.max_tile_size {
            None => whole(cols, rows),
            Some(_) => match self.edge(bytes_per_pixel) {
                Some(side) => grid(cols, rows, side),
                None => vec![],
            },
        }
    }

    /// Like `plan`, but an edge at least one square segment wide is rounded
    /// down to a whole number of segments so windows never split a segment.
    pub fn plan_aligned(
        &self,
        cols: u32,
        rows: u32,
        bytes_per_pixel: u64,
        segment: (u32, u32),
    ) -> Vec<PixelWindow> {
        match (self.max_tile_size, self.edge(bytes_per_pixel)) {
            (None, _) => whole(cols, rows),
            (Some(_), None) => vec![],
            (Some(_), Some(side)) => {
                let (seg_w, seg_h) = segment;
                let side = if seg_w == seg_h && seg_w > 0 && side >= seg_w {
                    side - side % seg_w
                } else {
                    side
                };
                grid(cols, rows, side)
            }
        }
    }
}

fn whole(cols: u32, rows: u32) -> Vec<PixelWindow> {
    let window = PixelWindow::full(cols, rows);
    if window.is_empty() {
        vec![]
    } else {
        vec![window]
    }
}

fn grid(cols: u32, rows: u32, side: u32) -> Vec<PixelWindow> {
    let mut windows = vec![];
    for row_min in (0..rows).step_by(side as usize) {
        for col_min in (0..cols).step_by(side as usize) {
            windows.push(PixelWindow::new(
                col_min,
                row_min,
                col_min.saturating_add(side).min(cols),
                row_min.saturating_add(side).min(rows),
            ));
        }
    }
    windows
}
