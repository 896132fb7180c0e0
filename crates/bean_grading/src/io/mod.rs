pub mod geojson;
pub mod report;
