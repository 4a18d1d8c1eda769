#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration as StdDuration};

use actix_web::{
    App, Error,
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    middleware::NormalizePath,
    test::TestRequest,
    web::Data,
};
use attendance::{
    attendance::{AttendanceService, IdentityResolver, payload},
    auth::jwt::generate_token,
    clock::FixedClock,
    config::Config,
    model::{
        identity::{Identity, IdentityKind, NewIdentity},
        role::Role,
    },
    models::TokenType,
    report::ReportService,
    routes,
    store::{MemoryStore, Store},
};
use chrono::{DateTime, TimeZone, Utc};

pub const SECRET: &str = "integration-secret";

pub fn peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40_000))
}

/// 2026-03-02 at the given UTC time.
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

pub struct TestCtx {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub config: Config,
}

impl TestCtx {
    pub fn new() -> Self {
        Self::with(&[])
    }

    /// Default test config with some variables overridden.
    pub fn with(overrides: &[(&str, &str)]) -> Self {
        let config = Config::from_lookup(|key| {
            if let Some((_, value)) = overrides.iter().find(|(k, _)| *k == key) {
                return Some(value.to_string());
            }
            match key {
                "STORE_BACKEND" => Some("memory".to_string()),
                "JWT_SECRET" => Some(SECRET.to_string()),
                "ATTENDANCE_CUTOFF" => Some("09:00".to_string()),
                "REPORT_MAX_RANGE_DAYS" => Some("7".to_string()),
                _ => None,
            }
        })
        .unwrap();

        Self {
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(FixedClock::new(at(8, 55))),
            config,
        }
    }

    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody + use<>>,
            Error = Error,
            InitError = (),
        > + use<>,
    > {
        let store: Arc<dyn Store> = self.store.clone();
        let resolver = IdentityResolver::new(store.clone(), 100, StdDuration::from_secs(60));
        let attendance = AttendanceService::new(
            store.clone(),
            resolver,
            self.config.lateness.clone(),
            self.clock.clone(),
        );
        let reports = ReportService::new(
            store.clone(),
            self.config.lateness.clone(),
            self.clock.clone(),
            self.config.report_max_range_days,
        );
        let config = self.config.clone();

        App::new()
            .wrap(NormalizePath::trim())
            .app_data(Data::<dyn Store>::from(store))
            .app_data(Data::new(self.config.clone()))
            .app_data(Data::new(attendance))
            .app_data(Data::new(reports))
            .configure(move |cfg| routes::configure(cfg, config))
    }

    pub fn token(&self, role: Role) -> String {
        let (token, _) = generate_token(
            TokenType::Access,
            1,
            "operator",
            role.id(),
            SECRET,
            900,
            Utc::now(),
        )
        .unwrap();
        token
    }

    pub async fn learner(&self, matricule: &str, cohort_id: Option<u64>) -> Identity {
        self.identity(IdentityKind::Learner, matricule, cohort_id).await
    }

    pub async fn identity(
        &self,
        kind: IdentityKind,
        matricule: &str,
        cohort_id: Option<u64>,
    ) -> Identity {
        self.store
            .create_identity(NewIdentity {
                kind,
                matricule: matricule.to_string(),
                first_name: "Awa".to_string(),
                last_name: "Diop".to_string(),
                email: None,
                cohort_id,
                qr_payload: payload::encode(kind, matricule, "Awa", "Diop"),
                created_at: at(7, 0),
            })
            .await
            .unwrap()
    }
}

pub fn get(uri: &str, token: &str) -> TestRequest {
    TestRequest::get()
        .uri(uri)
        .peer_addr(peer())
        .insert_header(("Authorization", format!("Bearer {token}")))
}

pub fn put(uri: &str, token: &str) -> TestRequest {
    TestRequest::put()
        .uri(uri)
        .peer_addr(peer())
        .insert_header(("Authorization", format!("Bearer {token}")))
}

pub fn post(uri: &str, token: &str) -> TestRequest {
    TestRequest::post()
        .uri(uri)
        .peer_addr(peer())
        .insert_header(("Authorization", format!("Bearer {token}")))
}
