pub mod axis_constraint;
pub mod constraints;
pub mod contact_solver;
pub mod integrator;
pub mod island;
