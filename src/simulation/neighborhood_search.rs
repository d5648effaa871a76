use crate::{aabb::Aabb, floating_type_mod::FT, V, V3, VI};

/**
 * Uniform grid over a fixed domain with cells at least as large as the kernel support radius.
 *
 * `rebuild` does not move any particle data itself. It returns the permutation that sorts the
 * particles by cell and the owner of the particle arrays has to apply it. After that, the
 * particles of every cell occupy one contiguous index range.
 */
pub struct UniformGrid {
    origin: V3,
    cell_size: FT,
    size: V<usize, 3>,

    // particles of cell c are cell_start[c]..cell_start[c + 1]
    cell_start: Vec<usize>,

    // scratch buffer reused between rebuilds
    particle_cells: Vec<usize>,
}

impl UniformGrid {
    pub fn new(bounds: Aabb, cell_size: FT) -> UniformGrid {
        assert!(cell_size > 0., "grid cell size has to be positive");

        let extents = bounds.extents();
        let size: V<usize, 3> = extents.map(|e| FT::max((e / cell_size).floor(), 1.) as usize);

        // stretch the cells so that `size` cells exactly cover the bounds (never below `cell_size`)
        let cell_size = (0..3)
            .map(|d| extents[d] / size[d] as FT)
            .fold(cell_size, FT::max);

        UniformGrid {
            origin: bounds.min,
            cell_size,
            size,
            cell_start: Vec::new(),
            particle_cells: Vec::new(),
        }
    }

    pub fn cell_size(&self) -> FT {
        self.cell_size
    }

    pub fn num_cells(&self) -> usize {
        self.size.fold(1, |acc, x| acc * x)
    }

    /** Cell coordinate of a position, clamped to the grid. */
    fn cell_pos(&self, p: V3) -> VI<3> {
        let mut cell = VI::<3>::zeros();
        for d in 0..3 {
            let c = ((p[d] - self.origin[d]) / self.cell_size).floor();
            cell[d] = FT::min(FT::max(c, 0.), (self.size[d] - 1) as FT) as i32;
        }
        cell
    }

    fn pos_to_idx(&self, cell_pos: VI<3>) -> usize {
        let mut multiplier = 1;
        let mut idx: usize = 0;
        for d in 0..3 {
            debug_assert!(0 <= cell_pos[d]);
            debug_assert!((cell_pos[d] as usize) < self.size[d]);
            idx += multiplier * cell_pos[d] as usize;
            multiplier *= self.size[d];
        }
        idx
    }

    /**
     * Re-buckets all particles and returns `order` where the particle with new index `k`
     * is the one that had index `order[k]` before.
     *
     * The sort is stable, so particles within one cell keep their relative order.
     */
    pub fn rebuild(&mut self, positions: &[V3]) -> Vec<usize> {
        let num_cells = self.num_cells();

        let mut particle_cells = std::mem::take(&mut self.particle_cells);
        particle_cells.clear();
        particle_cells.extend(positions.iter().map(|&p| self.pos_to_idx(self.cell_pos(p))));
        self.particle_cells = particle_cells;

        // counting sort
        self.cell_start.clear();
        self.cell_start.resize(num_cells + 1, 0);
        for &c in &self.particle_cells {
            self.cell_start[c + 1] += 1;
        }
        for c in 0..num_cells {
            self.cell_start[c + 1] += self.cell_start[c];
        }

        let mut next_slot = self.cell_start.clone();
        let mut order = vec![0; positions.len()];
        for (i, &c) in self.particle_cells.iter().enumerate() {
            order[next_slot[c]] = i;
            next_slot[c] += 1;
        }

        order
    }

    /** Index range of the particles inside the cell. Empty before the first rebuild. */
    pub fn cell_range(&self, cell_pos: VI<3>) -> std::ops::Range<usize> {
        if self.cell_start.is_empty() {
            return 0..0;
        }
        let idx = self.pos_to_idx(cell_pos);
        self.cell_start[idx]..self.cell_start[idx + 1]
    }

    /**
     * Calls `visit` for every particle in every cell that intersects the cube `point ± radius`.
     *
     * This is a superset of the particles within `radius`, so callers have to filter by distance.
     */
    pub fn query_radius(&self, point: V3, radius: FT, mut visit: impl FnMut(usize)) {
        if self.cell_start.is_empty() {
            return;
        }

        let lo = self.cell_pos(point - V3::repeat(radius));
        let hi = self.cell_pos(point + V3::repeat(radius));

        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                let row_start = self.pos_to_idx([lo.x, y, z].into());
                let row_end = self.pos_to_idx([hi.x, y, z].into());
                // cells of one row are adjacent, and so are their particle ranges
                for j in self.cell_start[row_start]..self.cell_start[row_end + 1] {
                    visit(j);
                }
            }
        }
    }
}
