/// Reporting layer: static PNG figures and the JSON fit summary.
pub mod colormap;
pub mod figures;
