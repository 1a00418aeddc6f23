pub mod broadphase;
pub mod bvh;
pub mod ccd;
pub mod clipping;
pub mod contact_cache;
pub mod edge_filter;
pub mod manifold;
pub mod narrowphase;
pub mod queries;
