//! Per-tenant identity directories
//!
//! Each tenant gets an admin-managed user pool, one web-app client and a
//! hosted login domain. The single cluster OIDC provider is declared by the
//! cluster component; tenants are separated by trust-policy subject claims,
//! not by separate issuers.

use tracing::debug;

use trellis_common::aws::{UserPool, UserPoolClient, UserPoolDomain};
use trellis_common::naming;
use trellis_common::{NodeId, ResourceGraph, ResourceNode, ResourceSpec, Result};

use crate::StackContext;

/// Scope of every node declared here
pub const SCOPE: &str = "identity";

/// One tenant's identity nodes
#[derive(Clone, Debug)]
pub struct TenantIdentity {
    /// Tenant id
    pub tenant: String,
    /// User pool
    pub user_pool: NodeId,
    /// App client
    pub client: NodeId,
    /// Hosted login domain
    pub domain: NodeId,
}

/// Public URL the tenant's web app is served from
pub fn tenant_app_url(tenant: &str, base_domain: &str) -> String {
    format!("https://{}.{}", tenant, base_domain)
}

/// Declare the identity directory of every tenant, in tenant order
pub fn declare(graph: &mut ResourceGraph, ctx: &StackContext<'_>) -> Result<Vec<TenantIdentity>> {
    let base_domain = ctx.config.base_domain();

    ctx.config
        .tenants
        .iter()
        .map(|tenant| {
            let scope = format!("{}/{}", SCOPE, tenant);

            let user_pool = graph.add(ResourceNode::new(
                NodeId::new(&scope, "user-pool"),
                ResourceSpec::UserPool(UserPool::admin_managed(naming::user_pool(tenant))),
            ))?;

            let client = graph.add(
                ResourceNode::new(
                    NodeId::new(&scope, "app-client"),
                    ResourceSpec::UserPoolClient(UserPoolClient::web_app(
                        user_pool.attr("id"),
                        naming::app_client(tenant),
                        &tenant_app_url(tenant, base_domain),
                    )),
                )
                .after(&user_pool),
            )?;

            let domain = graph.add(
                ResourceNode::new(
                    NodeId::new(&scope, "domain"),
                    ResourceSpec::UserPoolDomain(UserPoolDomain {
                        user_pool_id: user_pool.attr("id"),
                        domain: naming::user_pool_domain(tenant, ctx.id),
                    }),
                )
                .after(&user_pool),
            )?;

            debug!(tenant = %tenant, "declared identity directory");
            Ok(TenantIdentity {
                tenant: tenant.clone(),
                user_pool,
                client,
                domain,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use trellis_common::SystemConfig;

    #[test]
    fn client_and_domain_follow_the_pool() {
        let fixture = Fixture::default();
        let mut graph = ResourceGraph::new();
        let tenants = declare(&mut graph, &fixture.ctx()).unwrap();

        assert_eq!(tenants.len(), 2);
        assert_eq!(graph.len(), 6);
        graph.validate().unwrap();

        let a = &tenants[0];
        assert_eq!(a.tenant, "tenanta");
        let client = graph.get(a.client.as_str()).unwrap();
        assert_eq!(client.depends_on, vec![a.user_pool.clone()]);
        let props = client.spec.properties().unwrap();
        assert_eq!(props["userPoolId"], "${identity/tenanta/user-pool.id}");
        assert_eq!(props["clientName"], "tenanta-app-client");
    }

    #[test]
    fn callback_urls_use_the_configured_domain() {
        let fixture = Fixture::new(SystemConfig {
            domain: Some("chat.example.org".to_string()),
            ..SystemConfig::default()
        });
        let mut graph = ResourceGraph::new();
        declare(&mut graph, &fixture.ctx()).unwrap();

        let props = graph
            .get("identity/tenantb/app-client")
            .unwrap()
            .spec
            .properties()
            .unwrap();
        assert_eq!(
            props["oauth"]["callbackUrls"][0],
            "https://tenantb.chat.example.org/oauth2/callback"
        );
    }

    #[test]
    fn hosted_domain_carries_the_deployment_id() {
        let fixture = Fixture::default();
        let mut graph = ResourceGraph::new();
        declare(&mut graph, &fixture.ctx()).unwrap();
        let props = graph
            .get("identity/tenanta/domain")
            .unwrap()
            .spec
            .properties()
            .unwrap();
        assert_eq!(props["domain"], format!("tenanta-{}", fixture.id));
    }
}
