/// Row-major flat grid. No per-cell objects, f32 friendly.
/// `x` is the column, `y` the row (row 0 is the top of the raster).
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    pub data: Vec<T>,
    pub w: usize,
    pub h: usize,
}

impl<T: Copy + Default> Grid<T> {
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            data: vec![T::default(); w * h],
            w,
            h,
        }
    }

    /// Wrap an existing row-major buffer. Returns None if the length does not match.
    pub fn from_vec(w: usize, h: usize, data: Vec<T>) -> Option<Self> {
        if data.len() != w * h {
            return None;
        }
        Some(Self { data, w, h })
    }

    pub fn filled(w: usize, h: usize, v: T) -> Self {
        Self {
            data: vec![v; w * h],
            w,
            h,
        }
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.w && y < self.h);
        y * self.w + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.idx(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: T) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.w == other.w && self.h == other.h
    }

    /// Elementwise map into a grid of the same shape.
    pub fn map<U, F>(&self, f: F) -> Grid<U>
    where
        F: Fn(T) -> U,
    {
        Grid {
            data: self.data.iter().map(|&v| f(v)).collect(),
            w: self.w,
            h: self.h,
        }
    }
}

impl Grid<f32> {
    /// Min and max over finite cells. None if no cell is finite.
    pub fn finite_range(&self) -> Option<(f32, f32)> {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for &v in self.data.iter().filter(|v| v.is_finite()) {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if lo.is_finite() { Some((lo, hi)) } else { None }
    }
}
