//! Pipeline document fixtures.

use crate::errors::LoadError;
use crate::pipeline::PipelineDocument;

/// Source -> Build -> Deploy, one action each, chained through
/// `SourceOutput` and `buildOutput`.
pub const THREE_STAGE_YAML: &str = r"
name: three-stage
stages:
  - name: Source
    actions:
      - { name: Checkout, kind: source, outputs: [SourceOutput] }
  - name: Build
    actions:
      - { name: Compile, kind: build, inputs: [SourceOutput], outputs: [buildOutput] }
  - name: Deploy
    actions:
      - { name: Release, kind: deploy, inputs: [buildOutput] }
";

/// An any-of Source stage with two alternate sources, neither of which the
/// later stages depend on.
pub const ANY_OF_SOURCE_YAML: &str = r"
name: any-of-source
stages:
  - name: Source
    barrier: any_of
    actions:
      - { name: S3Source, kind: source, outputs: [S3Artifact] }
      - { name: CodeCommitSource, kind: source, outputs: [CodeCommitArtifact] }
  - name: Build
    actions:
      - { name: Package, kind: build, outputs: [Bundle] }
  - name: Deploy
    actions:
      - { name: Release, kind: deploy, inputs: [Bundle] }
";

/// The py-pipe stack with its resources, corrected so it validates.
///
/// The bundle is stored through `AppDeployment`, so the version that
/// deploys it depends on that write without an explicit edge.
pub const RESOURCE_STACK_YAML: &str = r#"
name: py-pipe
resources:
  - { id: RepositoryCodeCommit, kind: repository, properties: { repositoryName: myAppPy } }
  - { id: CodeCommitRepoBuild, kind: build_project }
  - { id: KekeB, kind: bucket, properties: { versioned: true } }
  - { id: AppDeployment, kind: storage_write, depends_on: [KekeB], properties: { destinationKeyPrefix: code/ } }
  - { id: ElasticAplication, kind: application, properties: { applicationName: MyApp } }
  - { id: AppVersion, kind: application_version, depends_on: [ElasticAplication] }
  - { id: AppPythonEnvironment, kind: environment, depends_on: [AppVersion] }
stages:
  - name: Source
    barrier: any_of
    actions:
      - name: S3Source
        kind: source
        outputs: [S3Artifact]
        provider: { capability: source_fetch, repository: "s3://KekeB/code/code.zip" }
        resource_dependencies: [KekeB]
      - name: CodeCommitSource
        kind: source
        outputs: [CodeCommitArtifact]
        provider: { capability: source_fetch, repository: myAppPy }
        resource: RepositoryCodeCommit
  - name: Build
    actions:
      - name: BuildFromS3
        kind: build
        inputs: [S3Artifact]
        outputs:
          - { name: BuildOutput, storage: AppDeployment }
        provider: { capability: build, project: CodeCommitRepoBuild }
        resource_dependencies: [CodeCommitRepoBuild]
  - name: Deploy
    actions:
      - name: ElasticBeanstalkDeploy
        kind: deploy
        inputs: [BuildOutput]
        provider: { capability: deploy, target: MyPythonEnvironment }
        resource: AppVersion
        resource_dependencies: [AppPythonEnvironment]
"#;

/// The py-pipe stack as originally written.
///
/// `BuildProject` consumes `BuildOutput`, which it produces itself in the same
/// stage. `S3BuildOutput` is never consumed and `EBArtifact` is never
/// produced.
pub const ORIGINAL_STACK_YAML: &str = r"
name: py-pipe
artifacts:
  - { name: EBArtifact }
stages:
  - name: Source
    actions:
      - { name: S3Source, kind: source, outputs: [S3Artifact] }
      - { name: CodeCommitSource, kind: source, outputs: [CodeCommitArtifact] }
  - name: Build
    actions:
      - { name: BuildFromS3, kind: build, inputs: [S3Artifact], outputs: [S3BuildOutput] }
      - { name: BuildProject, kind: build, inputs: [BuildOutput], outputs: [BuildOutput] }
  - name: Deploy
    actions:
      - { name: ElasticBeanstalkDeploy, kind: deploy, inputs: [BuildOutput] }
";

/// Parses [`THREE_STAGE_YAML`].
///
/// # Errors
///
/// Returns [`LoadError`] if the fixture does not parse.
pub fn three_stage_document() -> Result<PipelineDocument, LoadError> {
    PipelineDocument::from_yaml_str(THREE_STAGE_YAML)
}

/// Parses [`ANY_OF_SOURCE_YAML`].
///
/// # Errors
///
/// Returns [`LoadError`] if the fixture does not parse.
pub fn any_of_source_document() -> Result<PipelineDocument, LoadError> {
    PipelineDocument::from_yaml_str(ANY_OF_SOURCE_YAML)
}

/// Parses [`RESOURCE_STACK_YAML`].
///
/// # Errors
///
/// Returns [`LoadError`] if the fixture does not parse.
pub fn resource_stack_document() -> Result<PipelineDocument, LoadError> {
    PipelineDocument::from_yaml_str(RESOURCE_STACK_YAML)
}

/// Parses [`ORIGINAL_STACK_YAML`].
///
/// # Errors
///
/// Returns [`LoadError`] if the fixture does not parse.
pub fn original_stack_document() -> Result<PipelineDocument, LoadError> {
    PipelineDocument::from_yaml_str(ORIGINAL_STACK_YAML)
}
