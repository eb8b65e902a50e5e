//! SeaORM Entity Crate
//!
//! Defines the SeaORM entities that map to database tables.

pub mod camera_preset;
pub mod capture_result;
pub mod plant;
pub mod recipe;
pub mod recipe_image;
pub mod user;

// Prelude module for easy importing of all entities and their related types
pub mod prelude {
    pub use super::user::Entity as User;
    pub use super::user::Model as UserModel;
    pub use super::user::ActiveModel as UserActiveModel;
    pub use super::user::Column as UserColumn;

    pub use super::plant::Entity as Plant;
    pub use super::plant::Model as PlantModel;
    pub use super::plant::ActiveModel as PlantActiveModel;
    pub use super::plant::Column as PlantColumn;

    pub use super::capture_result::Entity as CaptureResult;
    pub use super::capture_result::Model as CaptureResultModel;
    pub use super::capture_result::ActiveModel as CaptureResultActiveModel;
    pub use super::capture_result::Column as CaptureResultColumn;

    pub use super::camera_preset::Entity as CameraPreset;
    pub use super::camera_preset::Model as CameraPresetModel;
    pub use super::camera_preset::ActiveModel as CameraPresetActiveModel;
    pub use super::camera_preset::Column as CameraPresetColumn;

    pub use super::recipe::Entity as Recipe;
    pub use super::recipe::Model as RecipeModel;
    pub use super::recipe::ActiveModel as RecipeActiveModel;
    pub use super::recipe::Column as RecipeColumn;

    pub use super::recipe_image::Entity as RecipeImage;
    pub use super::recipe_image::Model as RecipeImageModel;
    pub use super::recipe_image::ActiveModel as RecipeImageActiveModel;
    pub use super::recipe_image::Column as RecipeImageColumn;
}
