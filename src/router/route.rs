use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use regex::{Captures, Regex};

use crate::{
    context::CommandScope,
    error::{BotResult, HandlerResult},
    service::user::Role,
};

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult<()>> + Send>>;
pub type Handler = Arc<dyn Fn(CommandScope, Vec<String>) -> HandlerFuture + Send + Sync>;
pub type ParamMapper = fn(&Captures) -> Vec<String>;

/// Wraps an async fn into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(CommandScope, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    Arc::new(move |scope: CommandScope, args: Vec<String>| -> HandlerFuture { Box::pin(f(scope, args)) })
}

/// Every participating capture group, in order.
pub fn default_mapper(captures: &Captures) -> Vec<String> {
    captures
        .iter()
        .skip(1)
        .flatten()
        .map(|m| m.as_str().to_string())
        .collect()
}

#[derive(Clone)]
pub struct ParamGrammar {
    pub pattern: String,
    /// The pattern tolerates absent parameters on its own and is appended verbatim.
    pub optional: bool,
    pub mapper: ParamMapper,
}

/// Declarative route description, compiled by [`RouteTable::add_route`].
pub struct RouteSpec {
    aliases: Vec<String>,
    handler: Handler,
    grammar: Option<ParamGrammar>,
    roles: Vec<Role>,
    chats: Vec<i64>,
    feature: Option<String>,
    description: Option<String>,
}

impl RouteSpec {
    pub fn new(aliases: &[&str], handler: Handler) -> Self {
        Self {
            aliases: aliases.iter().map(|alias| alias.to_lowercase()).collect(),
            handler,
            grammar: None,
            roles: Vec::new(),
            chats: Vec::new(),
            feature: None,
            description: None,
        }
    }

    pub fn params(mut self, pattern: &str) -> Self {
        self.grammar = Some(ParamGrammar {
            pattern: pattern.to_string(),
            optional: false,
            mapper: default_mapper,
        });
        self
    }

    pub fn optional_params(mut self, pattern: &str) -> Self {
        self.grammar = Some(ParamGrammar {
            pattern: pattern.to_string(),
            optional: true,
            mapper: default_mapper,
        });
        self
    }

    pub fn mapper(mut self, mapper: ParamMapper) -> Self {
        if let Some(grammar) = self.grammar.as_mut() {
            grammar.mapper = mapper;
        }
        self
    }

    pub fn roles(mut self, roles: &[Role]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    pub fn chats(mut self, chats: &[i64]) -> Self {
        self.chats = chats.to_vec();
        self
    }

    pub fn feature(mut self, feature: &str) -> Self {
        self.feature = Some(feature.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn feature_name(&self) -> Option<&str> {
        self.feature.as_deref()
    }
}

pub struct Route {
    pub aliases: Vec<String>,
    pub handler: Handler,
    pub matcher: Regex,
    pub grammar: Option<ParamGrammar>,
    pub roles: Vec<Role>,
    pub allowed_chats: Vec<i64>,
    pub feature: Option<String>,
    pub description: Option<String>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("aliases", &self.aliases)
            .field("matcher", &self.matcher.as_str())
            .field("roles", &self.roles)
            .field("allowed_chats", &self.allowed_chats)
            .finish()
    }
}

impl Route {
    /// Positional arguments for `text`, or `None` when mandatory parameters did not match.
    pub fn bind(&self, text: &str) -> Option<Vec<String>> {
        let Some(grammar) = &self.grammar else {
            return Some(Vec::new());
        };

        match self.matcher.captures(text) {
            Some(captures) => Some((grammar.mapper)(&captures)),
            None if grammar.optional => Some(Vec::new()),
            None => None,
        }
    }
}

/// Alias lookup built once at startup and read-only afterwards.
pub struct RouteTable {
    bot_name: String,
    routes: HashMap<String, Arc<Route>>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("bot_name", &self.bot_name)
            .field("aliases", &self.routes.len())
            .finish()
    }
}

impl RouteTable {
    pub fn new(bot_name: &str) -> Self {
        Self {
            bot_name: bot_name.to_string(),
            routes: HashMap::new(),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Compiles `spec` and points every alias at the same route. A re-registered alias is replaced.
    pub fn add_route(&mut self, spec: RouteSpec) -> BotResult<Arc<Route>> {
        let aliases = spec
            .aliases
            .iter()
            .map(|alias| regex::escape(alias))
            .collect::<Vec<_>>()
            .join("|");

        let params = match &spec.grammar {
            None => String::new(),
            Some(grammar) if grammar.optional => grammar.pattern.clone(),
            Some(grammar) => format!(" {}", grammar.pattern),
        };

        let matcher = Regex::new(&format!(
            "^/(?i:{})(?:@(?i:{}))?{}$",
            aliases,
            regex::escape(&self.bot_name),
            params
        ))?;

        let route = Arc::new(Route {
            aliases: spec.aliases,
            handler: spec.handler,
            matcher,
            grammar: spec.grammar,
            roles: spec.roles,
            allowed_chats: spec.chats,
            feature: spec.feature,
            description: spec.description,
        });

        for alias in &route.aliases {
            if self.routes.insert(alias.clone(), Arc::clone(&route)).is_some() {
                debug!("Alias /{} re-registered, previous route replaced", alias);
            }
        }

        Ok(route)
    }

    pub fn resolve(&self, alias: &str) -> Option<Arc<Route>> {
        self.routes.get(alias).cloned()
    }

    /// Distinct routes, each once regardless of alias count, sorted by first alias.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        let mut unique: Vec<Arc<Route>> = Vec::new();
        for route in self.routes.values() {
            if !unique.iter().any(|known| Arc::ptr_eq(known, route)) {
                unique.push(Arc::clone(route));
            }
        }
        unique.sort_by(|a, b| a.aliases.first().cmp(&b.aliases.first()));
        unique
    }
}
