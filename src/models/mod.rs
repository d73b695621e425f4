pub mod metrics;
pub mod profile;
pub mod recommendation;
pub mod window;

pub use metrics::{MetricAggregate, WorkoutRecord};
pub use profile::{BiologicalSex, FitnessGoal, UserProfile};
pub use recommendation::{CoachAction, ComprehensiveRecommendations};
pub use window::AnalysisWindow;
