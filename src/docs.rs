use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::Components;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::auth::register,
		routes::auth::login,
		routes::auth::profile,
		routes::tasks::create_task,
		routes::tasks::list_my_tasks,
		routes::tasks::list_all_tasks,
		routes::tasks::get_task,
		routes::tasks::update_task,
		routes::tasks::delete_task,
		routes::users::list_users,
		routes::users::set_blocked,
		routes::health::health
	),
	components(
		schemas(
			models::user::Role,
			models::user::User,
			models::user::AuthResponse,
			models::user::ProfileResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::BlockRequest,
			models::task::Task,
			models::task::TaskCreateRequest,
			models::task::TaskUpdateRequest,
			models::task::MessageResponse,
			routes::health::HealthResponse
		)
	),
	modifiers(&BearerAuth),
	tags(
		(name = "Auth", description = "Registration, login and profile"),
		(name = "Tasks", description = "Per-user task management"),
		(name = "Users", description = "Account administration"),
		(name = "Health", description = "Liveness check")
	)
)]
pub struct ApiDoc;

/// Registers the `bearerAuth` scheme referenced by protected operations.
struct BearerAuth;

impl Modify for BearerAuth {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Components::new);
		components.add_security_scheme(
			"bearerAuth",
			SecurityScheme::Http(
				HttpBuilder::new()
					.scheme(HttpAuthScheme::Bearer)
					.bearer_format("JWT")
					.build(),
			),
		);
	}
}

pub fn openapi() -> utoipa::openapi::OpenApi {
	ApiDoc::openapi()
}

pub fn swagger_routes() -> Router {
	SwaggerUi::new("/docs")
		.url("/api-docs/openapi.json", openapi())
		.into()
}
