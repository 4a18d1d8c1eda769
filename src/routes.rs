use crate::{
    api::{attendance, identity, scan},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Per-route limiter, keyed by peer IP.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(requests_per_min)).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(GovernorConfig::default);
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let scan_limiter = Arc::new(build_limiter(config.rate_scan_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .service(
                web::scope("/users")
                    .wrap(protected_limiter.clone())
                    .service(web::resource("").route(web::post().to(handlers::create_user)))
                    // /users/{id}/active
                    .service(
                        web::resource("/{id}/active")
                            .route(web::put().to(handlers::set_user_active)),
                    ),
            )
            // scanning stations get their own, larger budget
            .service(
                web::scope("/scan")
                    .wrap(scan_limiter)
                    .service(web::resource("").route(web::post().to(scan::scan)))
                    .service(web::resource("/meal").route(web::post().to(scan::scan_meal))),
            )
            .service(
                web::scope("/identities")
                    .wrap(protected_limiter.clone())
                    // /identities
                    .service(
                        web::resource("")
                            .route(web::post().to(identity::create_identity))
                            .route(web::get().to(identity::list_identities)),
                    )
                    // /identities/{id}
                    .service(web::resource("/{id}").route(web::get().to(identity::get_identity)))
                    // /identities/{id}/qr
                    .service(web::resource("/{id}/qr").route(web::get().to(identity::identity_qr)))
                    // /identities/{id}/active
                    .service(
                        web::resource("/{id}/active")
                            .route(web::put().to(identity::set_identity_active)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    .wrap(protected_limiter.clone())
                    .service(web::resource("").route(web::get().to(attendance::list_attendance)))
                    .service(
                        web::resource("/summary").route(web::get().to(attendance::daily_summary)),
                    )
                    .service(
                        web::resource("/summary/range")
                            .route(web::get().to(attendance::range_summary)),
                    )
                    .service(
                        web::resource("/export")
                            .route(web::get().to(attendance::export_attendance)),
                    ),
            )
            .service(
                web::scope("/meals")
                    .wrap(protected_limiter)
                    .service(web::resource("/summary").route(web::get().to(scan::meal_summary))),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days, single use)

// SCAN STATION
//  └─ POST /api/scan { payload }  Authorization: Bearer access_token
//       └─ checkin | checkout | already-checked-in | already-checked-out

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new pair, old refresh token revoked
