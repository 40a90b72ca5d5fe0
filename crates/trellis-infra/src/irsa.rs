//! Workload-identity role binder
//!
//! Every role here is assumable only by pods presenting a projected token
//! from the cluster's OIDC issuer whose `sub` claim equals one exact
//! `system:serviceaccount:<namespace>:<name>` string. That string is the only
//! boundary between tenants sharing the cluster, so:
//!
//! - the issuer reference is checked before any role is declared (a broken
//!   reference yields roles nobody can assume, which fails silently);
//! - the issuer value itself is checked by the apply engine when it is
//!   recorded, ahead of every role ([`check_issuer_value`]);
//! - subjects are checked for uniqueness across all roles before any is
//!   declared.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use trellis_common::aws::{
    foundation_model_arn, ManagedPolicy, PolicyDocument, PolicyStatement, Role,
};
use trellis_common::naming;
use trellis_common::resource::{collect_tokens, ResourceKind};
use trellis_common::{
    Error, NodeId, ResourceGraph, ResourceNode, ResourceSpec, Result, KUBE_SYSTEM_NAMESPACE,
};

use crate::cluster::ClusterNodes;
use crate::storage::StorageNodes;
use crate::StackContext;

/// Scope of every node declared here
pub const SCOPE: &str = "irsa";

/// Namespace of the envoy reverse proxy
pub const ENVOY_PROXY_NAMESPACE: &str = "envoy-reverse-proxy-ns";

/// Service account of the envoy reverse proxy
pub const ENVOY_PROXY_SERVICE_ACCOUNT: &str = "envoy-reverse-proxy-sa";

/// Service account of the AWS load balancer controller
pub const ALB_CONTROLLER_SERVICE_ACCOUNT: &str = "aws-load-balancer-controller";

/// Permissions the load balancer controller needs, as published upstream
static ALB_CONTROLLER_POLICY: &str = include_str!("../policies/aws-load-balancer-controller.json");

const OBJECT_READ: [&str; 2] = ["s3:GetObject", "s3:GetObjectVersion"];

const TABLE_CRUD: [&str; 10] = [
    "dynamodb:GetItem",
    "dynamodb:BatchGetItem",
    "dynamodb:Query",
    "dynamodb:DescribeTable",
    "dynamodb:DeleteItem",
    "dynamodb:Scan",
    "dynamodb:PutItem",
    "dynamodb:UpdateItem",
    "dynamodb:BatchWriteItem",
    "dynamodb:ConditionCheckItem",
];

/// Handles to the declared roles
#[derive(Clone, Debug)]
pub struct IrsaNodes {
    /// Envoy reverse-proxy role
    pub envoy_proxy: NodeId,
    /// Load balancer controller managed policy
    pub alb_controller_policy: NodeId,
    /// Load balancer controller role
    pub alb_controller: NodeId,
    /// Tenant application roles keyed by tenant id
    pub tenants: BTreeMap<String, NodeId>,
}

/// A role bound to one service account, before it is added to the graph
struct Binding {
    id: NodeId,
    subject: String,
    role: Role,
    depends_on: Vec<NodeId>,
}

impl Binding {
    fn new(
        ctx: &StackContext<'_>,
        issuer: &str,
        logical_id: &str,
        role_name: Option<String>,
        namespace: &str,
        service_account: &str,
    ) -> Self {
        let subject = naming::service_account_subject(namespace, service_account);
        let trust = PolicyDocument::web_identity_trust(ctx.account(), issuer, &subject);
        Self {
            id: NodeId::new(SCOPE, logical_id),
            subject,
            role: Role::new(role_name, trust),
            depends_on: Vec::new(),
        }
    }

    fn after(mut self, dependency: &NodeId) -> Self {
        self.depends_on.push(dependency.clone());
        self
    }
}

/// Return the issuer token of `oidc_provider` after checking that it names
/// a declared OIDC provider exposing an `issuer` attribute.
pub fn oidc_issuer(graph: &ResourceGraph, oidc_provider: &NodeId) -> Result<String> {
    let node = graph.get(oidc_provider.as_str()).ok_or_else(|| {
        Error::validation_for(
            SCOPE,
            format!("OIDC provider {} is not declared", oidc_provider),
        )
    })?;
    if node.kind() != ResourceKind::OidcProvider {
        return Err(Error::validation_for(
            SCOPE,
            format!(
                "{} is a {}, not an OidcProvider",
                oidc_provider,
                node.kind()
            ),
        ));
    }

    let token = oidc_provider.attr("issuer");
    let refs = collect_tokens(&serde_json::Value::String(token.clone()))
        .map_err(|e| Error::validation_for(SCOPE, e))?;
    match refs.as_slice() {
        [r] if r.node == *oidc_provider
            && ResourceKind::OidcProvider
                .attributes()
                .contains(&r.attribute.as_str()) =>
        {
            Ok(token)
        }
        _ => Err(Error::validation_for(
            SCOPE,
            format!("'{}' is not a usable issuer reference", token),
        )),
    }
}

/// Check an issuer value recorded for a cluster or OIDC provider.
///
/// Trust conditions and provider ARNs splice the issuer in as `host/path`,
/// so a scheme or an empty segment makes every trust policy unsatisfiable.
pub fn check_issuer_value(resource: &str, issuer: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(Error::validation_for(
            resource,
            format!("issuer '{}' {}", issuer, reason),
        ))
    };
    if issuer.contains("://") {
        return reject("must not carry a scheme");
    }
    if issuer.chars().any(char::is_whitespace) {
        return reject("must not contain whitespace");
    }
    match issuer.split_once('/') {
        Some((host, path)) if !host.is_empty() && !path.is_empty() && !issuer.ends_with('/') => {
            Ok(())
        }
        _ => reject("must have the form host/path"),
    }
}

fn reject_duplicate_subjects(bindings: &[Binding]) -> Result<()> {
    let mut seen: HashMap<&str, &NodeId> = HashMap::new();
    for binding in bindings {
        if let Some(other) = seen.insert(binding.subject.as_str(), &binding.id) {
            return Err(Error::validation_for(
                binding.id.as_str(),
                format!(
                    "subject '{}' is already trusted by {}",
                    binding.subject, other
                ),
            ));
        }
    }
    Ok(())
}

/// Declare the envoy proxy, load balancer controller and tenant roles
pub fn declare(
    graph: &mut ResourceGraph,
    ctx: &StackContext<'_>,
    cluster: &ClusterNodes,
    storage: &StorageNodes,
) -> Result<IrsaNodes> {
    let issuer = oidc_issuer(graph, &cluster.oidc_provider)?;
    let oidc = &cluster.oidc_provider;

    let policy_document: serde_json::Value =
        serde_json::from_str(ALB_CONTROLLER_POLICY).map_err(|e| {
            Error::serialization_for_kind(ResourceKind::ManagedPolicy.as_str(), e.to_string())
        })?;
    let alb_policy_id = NodeId::new(SCOPE, "alb-controller-policy");

    let mut bindings = Vec::with_capacity(ctx.config.tenants.len() + 2);

    let mut envoy = Binding::new(
        ctx,
        &issuer,
        "envoy-proxy-role",
        None,
        ENVOY_PROXY_NAMESPACE,
        ENVOY_PROXY_SERVICE_ACCOUNT,
    )
    .after(oidc)
    .after(&storage.envoy_config);
    envoy.role = envoy.role.with_statement(PolicyStatement::allow(
        OBJECT_READ,
        [format!("{}/*", storage.envoy_config.attr("arn"))],
    ));
    bindings.push(envoy);

    let mut alb = Binding::new(
        ctx,
        &issuer,
        "alb-controller-role",
        None,
        KUBE_SYSTEM_NAMESPACE,
        ALB_CONTROLLER_SERVICE_ACCOUNT,
    )
    .after(oidc)
    .after(&alb_policy_id);
    alb.role = alb.role.with_managed_policy(alb_policy_id.attr("arn"));
    bindings.push(alb);

    let model_arns = [
        foundation_model_arn(ctx.region(), &ctx.config.text2text_model_id),
        foundation_model_arn(ctx.region(), &ctx.config.embedding_model_id),
    ];
    let mut tenant_ids = BTreeMap::new();
    for tenant in &ctx.config.tenants {
        let store = storage.tenant(tenant).ok_or_else(|| {
            Error::dependency(
                format!("{}/{}", SCOPE, tenant),
                format!("no storage declared for tenant '{}'", tenant),
            )
        })?;
        let mut binding = Binding::new(
            ctx,
            &issuer,
            &format!("{}/app-role", tenant),
            Some(naming::tenant_role(tenant, ctx.id)),
            &naming::tenant_namespace(tenant),
            &naming::tenant_service_account(tenant),
        )
        .after(oidc)
        .after(&store.bucket)
        .after(&store.sessions)
        .after(&store.chat_history);

        let tables = [&store.sessions, &store.chat_history]
            .into_iter()
            .flat_map(|t| [t.attr("arn"), format!("{}/index/*", t.attr("arn"))]);
        binding.role = binding
            .role
            .with_statement(PolicyStatement::allow(
                OBJECT_READ,
                [format!("{}/*", store.bucket.attr("arn"))],
            ))
            .with_statement(PolicyStatement::allow(TABLE_CRUD, tables))
            .with_statement(PolicyStatement::allow(
                ["bedrock:InvokeModel"],
                model_arns.iter().cloned(),
            ));
        tenant_ids.insert(tenant.clone(), binding.id.clone());
        bindings.push(binding);
    }

    reject_duplicate_subjects(&bindings)?;

    let alb_controller_policy = graph.add(ResourceNode::new(
        alb_policy_id,
        ResourceSpec::ManagedPolicy(ManagedPolicy {
            managed_policy_name: format!("AWSLoadBalancerControllerIAMPolicy-{}", ctx.id),
            policy_document,
        }),
    ))?;

    let mut ids = Vec::with_capacity(bindings.len());
    for binding in bindings {
        debug!(role = %binding.id, subject = %binding.subject, "declared workload-identity role");
        let id = graph.add(
            ResourceNode::new(binding.id, ResourceSpec::Role(binding.role))
                .after_all(&binding.depends_on),
        )?;
        ids.push(id);
    }

    let mut ids = ids.into_iter();
    let (Some(envoy_proxy), Some(alb_controller)) = (ids.next(), ids.next()) else {
        return Err(Error::internal_with_context(SCOPE, "shared roles were not declared"));
    };

    Ok(IrsaNodes {
        envoy_proxy,
        alb_controller_policy,
        alb_controller,
        tenants: tenant_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use crate::{cluster, network, storage};
    use rstest::rstest;
    use serde_json::json;
    use trellis_common::aws::{Bucket, PolicyDocument};
    use trellis_common::SystemConfig;

    fn declare_all(fixture: &Fixture) -> Result<(ResourceGraph, IrsaNodes)> {
        let ctx = fixture.ctx();
        let mut graph = ResourceGraph::new();
        let net = network::declare(&mut graph, &ctx)?;
        let store = storage::declare(&mut graph, &ctx)?;
        let cl = cluster::declare(&mut graph, &ctx, &net)?;
        let nodes = declare(&mut graph, &ctx, &cl, &store)?;
        Ok((graph, nodes))
    }

    fn trust_of(graph: &ResourceGraph, id: &NodeId) -> PolicyDocument {
        let props = graph.get(id.as_str()).unwrap().spec.properties().unwrap();
        serde_json::from_value(props["assumeRolePolicyDocument"].clone()).unwrap()
    }

    #[test]
    fn trust_pins_one_audience_and_one_subject() {
        let fixture = Fixture::default();
        let (graph, nodes) = declare_all(&fixture).unwrap();
        graph.validate().unwrap();

        for (tenant, id) in &nodes.tenants {
            let trust = trust_of(&graph, id);
            assert_eq!(trust.audience_claims(), vec!["sts.amazonaws.com"]);
            assert_eq!(
                trust.subject_claims(),
                vec![format!("system:serviceaccount:{}-ns:{}-sa", tenant, tenant)]
            );
            let statement = &trust.statement[0];
            assert_eq!(statement.action, vec!["sts:AssumeRoleWithWebIdentity"]);
            assert!(statement.condition.contains_key("StringEquals"));
        }
    }

    #[test]
    fn tenant_role_is_scoped_to_its_own_storage() {
        let fixture = Fixture::default();
        let (graph, nodes) = declare_all(&fixture).unwrap();
        let props = graph
            .get(nodes.tenants["tenanta"].as_str())
            .unwrap()
            .spec
            .properties()
            .unwrap();

        assert_eq!(
            props["roleName"],
            format!("tenanta-app-access-role-{}", fixture.id)
        );
        let rendered = props["policy"].to_string();
        assert!(rendered.contains("storage/tenanta/bucket.arn"));
        assert!(rendered.contains("storage/tenanta/sessions-table.arn}/index/*"));
        assert!(!rendered.contains("tenantb"));
        assert_eq!(
            props["policy"]["Statement"][2]["Resource"],
            json!([
                "arn:aws:bedrock:us-east-1::foundation-model/meta.llama3-8b-instruct-v1:0",
                "arn:aws:bedrock:us-east-1::foundation-model/amazon.titan-embed-text-v2:0"
            ])
        );
    }

    #[test]
    fn shared_roles_are_declared_once() {
        let fixture = Fixture::default();
        let (graph, nodes) = declare_all(&fixture).unwrap();
        let envoy = trust_of(&graph, &nodes.envoy_proxy);
        assert_eq!(
            envoy.subject_claims(),
            vec!["system:serviceaccount:envoy-reverse-proxy-ns:envoy-reverse-proxy-sa"]
        );
        let alb = graph.get(nodes.alb_controller.as_str()).unwrap();
        assert!(alb.depends_on.contains(&nodes.alb_controller_policy));
        let policy = graph
            .get(nodes.alb_controller_policy.as_str())
            .unwrap()
            .spec
            .properties()
            .unwrap();
        assert_eq!(policy["policyDocument"]["Version"], "2012-10-17");
    }

    /// Story: a tenant whose namespace and service account collide with the
    /// envoy proxy's would be able to assume the proxy role
    #[test]
    fn story_colliding_subject_is_rejected_before_any_role() {
        let fixture = Fixture::new(SystemConfig {
            tenants: vec!["tenanta".to_string(), "envoy-reverse-proxy".to_string()],
            ..SystemConfig::default()
        });
        let ctx = fixture.ctx();
        let mut graph = ResourceGraph::new();
        let net = network::declare(&mut graph, &ctx).unwrap();
        let store = storage::declare(&mut graph, &ctx).unwrap();
        let cl = cluster::declare(&mut graph, &ctx, &net).unwrap();

        let err = declare(&mut graph, &ctx, &cl, &store).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("envoy-reverse-proxy-ns"));
        assert!(!graph.nodes().any(|n| n.id.scope() == SCOPE));
    }

    #[rstest]
    #[case::not_declared("cluster/oidc-provider", false)]
    #[case::wrong_kind("storage/envoy-config-bucket", true)]
    fn invalid_issuer_reference_is_rejected(#[case] id: &str, #[case] declare_it: bool) {
        let mut graph = ResourceGraph::new();
        if declare_it {
            graph
                .add(ResourceNode::new(
                    id,
                    ResourceSpec::Bucket(Bucket::private("b")),
                ))
                .unwrap();
        }
        let err = oidc_issuer(&graph, &NodeId::from(id)).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[rstest]
    #[case::with_scheme("https://oidc.eks.us-east-1.amazonaws.com/id/ABC")]
    #[case::host_only("oidc.eks.us-east-1.amazonaws.com")]
    #[case::trailing_slash("oidc.eks.us-east-1.amazonaws.com/id/")]
    #[case::empty_host("/id/ABC")]
    #[case::whitespace("oidc.eks.us-east-1.amazonaws.com/id/ ABC")]
    fn unusable_issuer_values_are_rejected(#[case] issuer: &str) {
        let err = check_issuer_value("cluster/oidc-provider", issuer).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn host_and_path_issuer_is_accepted() {
        check_issuer_value("cluster/oidc-provider", "oidc.eks.us-east-1.amazonaws.com/id/ABC")
            .unwrap();
    }

    #[test]
    fn valid_issuer_reference_yields_token() {
        let fixture = Fixture::default();
        let ctx = fixture.ctx();
        let mut graph = ResourceGraph::new();
        let net = network::declare(&mut graph, &ctx).unwrap();
        let cl = cluster::declare(&mut graph, &ctx, &net).unwrap();
        assert_eq!(
            oidc_issuer(&graph, &cl.oidc_provider).unwrap(),
            "${cluster/oidc-provider.issuer}"
        );
    }
}
