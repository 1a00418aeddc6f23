use std::time::Duration;

/// Per-step timing and count data, attached to the world and reset each step.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhysicsProfiler {
    pub broad_phase_time: Duration,
    pub narrow_phase_time: Duration,
    pub solver_time: Duration,
    pub integrate_time: Duration,
    pub ccd_time: Duration,
    pub total_step_time: Duration,

    pub body_count: usize,
    pub pair_count: usize,
    pub manifold_count: usize,
    pub island_count: usize,
    pub ccd_body_count: usize,
}

impl PhysicsProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn report(&self) {
        let total_us = self.total_step_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        let ms = |d: Duration| d.as_secs_f32() * 1000.0;
        let pct = |d: Duration| (d.as_micros() as f32 / total_us) * 100.0;

        log::debug!(
            "step {:.2} ms | bodies {} pairs {} manifolds {} islands {} ccd {}",
            ms(self.total_step_time),
            self.body_count,
            self.pair_count,
            self.manifold_count,
            self.island_count,
            self.ccd_body_count
        );
        log::debug!(
            "  broad {:.2} ms ({:.1}%) narrow {:.2} ms ({:.1}%) solve {:.2} ms ({:.1}%) integrate {:.2} ms ({:.1}%) ccd {:.2} ms ({:.1}%)",
            ms(self.broad_phase_time),
            pct(self.broad_phase_time),
            ms(self.narrow_phase_time),
            pct(self.narrow_phase_time),
            ms(self.solver_time),
            pct(self.solver_time),
            ms(self.integrate_time),
            pct(self.integrate_time),
            ms(self.ccd_time),
            pct(self.ccd_time)
        );
    }
}

