use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::checkout::create_checkout_session,
        crate::api::webhooks::stripe_webhook,
        crate::api::moderate::moderate,
        crate::api::moderate::process_media,
        crate::api::content::upload_content,
        crate::api::content::get_content,
        crate::api::content::decrypt_content,
        crate::api::chain::list_chains,
        crate::api::chain::get_chain,
        crate::api::chain::subscription_status,
        crate::api::chain::allowance,
        crate::api::chain::ppv_access,
        crate::api::chain::creator_token_balance
    ),
    components(
        schemas(
            crate::api::checkout::CreateCheckoutRequest,
            crate::api::checkout::CreateCheckoutResponse,
            crate::api::moderate::ModerateRequest,
            crate::api::moderate::ProcessMediaRequest,
            crate::api::content::UploadResponse,
            crate::api::content::DecryptRequest,
            crate::api::content::DecryptResponse,
            crate::api::chain::ChainList,
            crate::api::chain::ChainInfo,
            crate::api::chain::SubscriptionStatus,
            crate::api::chain::AllowanceResponse,
            crate::chains::ContractSet,
            crate::models::ContentRecord,
            crate::models::SubscriptionInfo,
            crate::models::ProductType,
            crate::models::PaymentMethod,
            crate::moderation::MediaKind,
            crate::media::MediaOperation
        )
    ),
    tags(
        (name = "fiat", description = "Card checkout and the Stripe webhook"),
        (name = "moderation", description = "Content moderation and media processing"),
        (name = "content", description = "Encrypted content on IPFS"),
        (name = "chain", description = "On-chain reads on the active chain")
    )
)]
pub struct ApiDoc;
