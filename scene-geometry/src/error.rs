use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("camera has no pose")]
    NoPose,
    #[error("region polygon has fewer than 3 vertices")]
    DegeneratePolygon,
    #[error("tripwire needs at least 2 points")]
    DegenerateTripwire,
    #[error("trs_xyz_to_lla requires both output_lla and four map_corners_lla")]
    MissingLlaPrerequisites,
    #[error("cam-geom error: {0}")]
    CamGeom(String),
}

pub type Result<T> = std::result::Result<T, GeometryError>;
