mod admin;
mod basic;
mod embassy;
mod keyboard;
mod status;
mod welcome;

use std::sync::Arc;

pub use welcome::gate_new_member;

use crate::{
    config::RouterConfig,
    error::BotResult,
    router::{handler, Handler, RouteSpec, RouteTable},
    service::{
        live::{LiveKind, LiveRunner},
        user::Role::{Admin, Member, Trusted},
        ServiceRegistry,
    },
    transport::ChatTransport,
};

/// Every command the bot understands, in registration order.
pub fn route_specs() -> Vec<RouteSpec> {
    vec![
        RouteSpec::new(&["start"], handler(basic::start)).description("commands.start"),
        RouteSpec::new(&["help"], handler(basic::help)).description("commands.help"),
        RouteSpec::new(&["status", "s"], handler(status::status))
            .optional_params(r"(?: (short))?")
            .description("commands.status"),
        RouteSpec::new(&["in", "iaminside"], handler(status::check_in))
            .optional_params(r"(?: (\S+))?")
            .description("commands.in"),
        RouteSpec::new(&["inghost"], handler(status::check_in_ghost))
            .roles(&[Member])
            .description("commands.inghost"),
        RouteSpec::new(&["out", "iamleaving"], handler(status::check_out)).description("commands.out"),
        RouteSpec::new(&["going", "coming"], handler(status::going))
            .optional_params(r"(?: (.+))?")
            .description("commands.going"),
        RouteSpec::new(&["notgoing", "notcoming"], handler(status::not_going)).description("commands.notgoing"),
        RouteSpec::new(&["inforce"], handler(status::in_force))
            .params(r"(\S+)(?: (\S+))?")
            .roles(&[Member]),
        RouteSpec::new(&["outforce"], handler(status::out_force))
            .params(r"(\S+)")
            .roles(&[Member]),
        RouteSpec::new(&["open", "o"], handler(status::open))
            .roles(&[Member])
            .description("commands.open"),
        RouteSpec::new(&["close", "c"], handler(status::close))
            .roles(&[Member])
            .description("commands.close"),
        RouteSpec::new(&["evict"], handler(status::evict)).roles(&[Member]),
        RouteSpec::new(&["mytime"], handler(status::my_time)).description("commands.mytime"),
        RouteSpec::new(&["visits"], handler(status::visits))
            .optional_params(r"(?: (\d+))?")
            .roles(&[Member]),
        RouteSpec::new(&["autoinside"], handler(status::autoinside))
            .optional_params(r"(?: (enabled|disabled|ghost))?")
            .roles(&[Member])
            .feature("embassy"),
        RouteSpec::new(&["setmac"], handler(status::set_mac))
            .params(r"(.+)")
            .roles(&[Member])
            .feature("embassy"),
        RouteSpec::new(&["ping"], handler(embassy::ping))
            .params(r"(\S+)")
            .roles(&[Member])
            .feature("embassy"),
        RouteSpec::new(&["unlock"], handler(embassy::unlock))
            .roles(&[Member])
            .feature("embassy")
            .description("commands.unlock"),
        RouteSpec::new(&["webcam", "cam"], handler(embassy::webcam))
            .optional_params(r"(?: (\w+))?")
            .roles(&[Member, Trusted])
            .feature("embassy")
            .description("commands.webcam"),
        RouteSpec::new(&["setroles"], handler(admin::set_roles))
            .params(r"(\S+) (\S+)")
            .roles(&[Admin]),
        RouteSpec::new(&["stoplive"], handler(admin::stop_live)).roles(&[Admin]),
    ]
}

/// Compiles [`route_specs`] without the routes of disabled features.
pub fn build_route_table(config: &RouterConfig) -> BotResult<RouteTable> {
    let mut table = RouteTable::new(&config.bot_name);

    for spec in route_specs() {
        if let Some(feature) = spec.feature_name() {
            if config.disabled_features.iter().any(|disabled| disabled == feature) {
                debug!("Skipping route of disabled feature {}", feature);
                continue;
            }
        }
        table.add_route(spec)?;
    }

    info!("Route table built with {} commands", table.routes().len());
    Ok(table)
}

pub fn verification_handler() -> Handler {
    handler(welcome::verify)
}

/// Rebuilds the runner of a persisted live handler.
pub fn live_runner(kind: LiveKind, services: ServiceRegistry, transport: Arc<dyn ChatTransport>) -> LiveRunner {
    match kind {
        LiveKind::StatusLive => status::live_runner(services, transport),
        LiveKind::CamLive => embassy::live_runner(services, transport),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_disabled_features_remove_routes() {
        let mut config = AppConfig::new_test_config().router;
        assert!(build_route_table(&config).unwrap().resolve("unlock").is_some());

        config.disabled_features = vec!["embassy".to_string()];
        let table = build_route_table(&config).unwrap();

        assert!(table.resolve("unlock").is_none());
        assert!(table.resolve("cam").is_none());
        assert!(table.resolve("status").is_some());
    }
}
