pub mod apprenticeship;
pub mod archive;
pub mod notifications;
pub mod quality;
pub mod referentiel;
