/// 代表一个体素索引(i, j, k)，不负责边界检查。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Voxel {
    pub i: usize,
    pub j: usize,
    pub k: usize,
}

impl Voxel {
    #[inline]
    pub fn new(i: usize, j: usize, k: usize) -> Self {
        Self { i, j, k }
    }

    #[inline]
    pub fn to_index(self) -> [usize; 3] {
        [self.i, self.j, self.k]
    }

    /// 按`offset`平移；结果落在`shape`之外时返回`None`。
    #[inline]
    pub fn shifted(self, offset: Offset, shape: [usize; 3]) -> Option<Voxel> {
        let i = self.i as i64 + offset.0;
        let j = self.j as i64 + offset.1;
        let k = self.k as i64 + offset.2;
        let inside = |v: i64, len: usize| v >= 0 && (v as u64) < len as u64;
        (inside(i, shape[0]) && inside(j, shape[1]) && inside(k, shape[2]))
            .then(|| Voxel::new(i as usize, j as usize, k as usize))
    }
}

impl From<(usize, usize, usize)> for Voxel {
    #[inline]
    fn from(v: (usize, usize, usize)) -> Self {
        Voxel::new(v.0, v.1, v.2)
    }
}

/// 体素坐标的有符号位移。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Offset(pub i64, pub i64, pub i64);

/// 以物理半径`radius_mm`、体素间距`spacing`构成的椭球结构元素（含原点）。
pub fn ball_offsets(radius_mm: f64, spacing: [f64; 3]) -> Vec<Offset> {
    let r = radius_mm.abs();
    let reach = |s: f64| (r / s).floor() as i64;
    let (ri, rj, rk) = (reach(spacing[0]), reach(spacing[1]), reach(spacing[2]));
    let r2 = r * r + 1e-9;
    let mut offsets = Vec::new();
    for di in -ri..=ri {
        for dj in -rj..=rj {
            for dk in -rk..=rk {
                let d2 = (di as f64 * spacing[0]).powi(2)
                    + (dj as f64 * spacing[1]).powi(2)
                    + (dk as f64 * spacing[2]).powi(2);
                if d2 <= r2 {
                    offsets.push(Offset(di, dj, dk));
                }
            }
        }
    }
    offsets
}

/// 按行优先顺序遍历一个三维网格中的全部体素。
pub struct VoxelIter {
    cur: [usize; 3],
    shape: [usize; 3],
    done: bool,
}

impl VoxelIter {
    #[inline]
    pub fn new(shape: [usize; 3]) -> Self {
        Self {
            cur: [0; 3],
            shape,
            done: shape.iter().any(|&n| n == 0),
        }
    }
}

impl Iterator for VoxelIter {
    type Item = Voxel;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let ret = Voxel::new(self.cur[0], self.cur[1], self.cur[2]);
        for axis in (0..3).rev() {
            self.cur[axis] += 1;
            if self.cur[axis] < self.shape[axis] {
                return Some(ret);
            }
            self.cur[axis] = 0;
        }
        self.done = true;
        Some(ret)
    }
}
