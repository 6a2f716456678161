pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_auth;
pub use rest::{
    clear_data_handler, create_item_handler, delete_item_handler, export_backup_handler,
    import_backup_handler, import_schedule_handler, patch_item_handler, shared_note_handler,
    shared_schedule_handler, toggle_task_handler, ApiDoc,
};
pub use state::AppState;
