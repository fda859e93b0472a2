pub mod auth;
pub mod chain;
pub mod checkout;
pub mod content;
pub mod moderate;
pub mod stripe;
pub mod stripe_client;
pub mod webhooks;

use actix_web::web;

/// Mounts every `/api` route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(checkout::create_checkout_session)
            .service(webhooks::stripe_webhook)
            .service(moderate::moderate)
            .service(moderate::process_media)
            .service(content::upload_content)
            .service(content::get_content)
            .service(content::decrypt_content)
            .service(chain::list_chains)
            .service(chain::get_chain)
            .service(chain::subscription_status)
            .service(chain::allowance)
            .service(chain::ppv_access)
            .service(chain::creator_token_balance),
    );
}
