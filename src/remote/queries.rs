//! GraphQL documents issued against the remote API. The owner is always
//! queried as both organization and user; at most one root resolves and the
//! client tolerates NOT_FOUND on the other.

pub const PROJECT_METADATA: &str = r#"
query($owner: String!, $number: Int!) {
  organization(login: $owner) {
    projectV2(number: $number) {
      id
      title
      fields(first: 50) {
        nodes {
          __typename
          ... on ProjectV2FieldCommon { id name dataType }
          ... on ProjectV2IterationField { id name configuration { iterations { id title startDate duration } } }
          ... on ProjectV2SingleSelectField { id name options { id name color } }
        }
      }
    }
  }
  user(login: $owner) {
    projectV2(number: $number) {
      id
      title
      fields(first: 50) {
        nodes {
          __typename
          ... on ProjectV2FieldCommon { id name dataType }
          ... on ProjectV2IterationField { id name configuration { iterations { id title startDate duration } } }
          ... on ProjectV2SingleSelectField { id name options { id name color } }
        }
      }
    }
  }
}"#;

pub const LIST_PROJECTS: &str = r#"
query($owner: String!) {
  organization(login: $owner) {
    projectsV2(first: 50) {
      nodes { id number title updatedAt }
    }
  }
  user(login: $owner) {
    projectsV2(first: 50) {
      nodes { id number title updatedAt }
    }
  }
}"#;

pub const PROJECT_ITEMS_PAGE: &str = r#"
query($projectId: ID!, $first: Int!, $after: String) {
  node(id: $projectId) {
    ... on ProjectV2 {
      items(first: $first, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes {
          id
          updatedAt
          content {
            __typename
            ... on Issue { id title url updatedAt assignees(first: 20) { nodes { login } } }
            ... on PullRequest { id title url updatedAt assignees(first: 20) { nodes { login } } }
            ... on DraftIssue { id title }
          }
          fieldValues(first: 50) {
            nodes {
              __typename
              ... on ProjectV2ItemFieldTextValue { field { ... on ProjectV2FieldCommon { name } } text }
              ... on ProjectV2ItemFieldNumberValue { field { ... on ProjectV2FieldCommon { name } } number }
              ... on ProjectV2ItemFieldSingleSelectValue { field { ... on ProjectV2FieldCommon { name } } name optionId }
              ... on ProjectV2ItemFieldDateValue { field { ... on ProjectV2FieldCommon { name dataType } } date }
              ... on ProjectV2ItemFieldIterationValue {
                field { ... on ProjectV2FieldCommon { name } }
                title
                iterationId
                startDate
                duration
              }
            }
          }
        }
      }
    }
  }
}"#;

pub const ITEM_DETAILS: &str = r#"
query($id: ID!) {
  node(id: $id) {
    __typename
    ... on Issue {
      id number title body state url createdAt updatedAt
      author { login url avatarUrl }
      labels(first: 20) { nodes { name color } }
    }
    ... on PullRequest {
      id number title body state merged url createdAt updatedAt
      author { login url avatarUrl }
      labels(first: 20) { nodes { name color } }
    }
  }
}"#;

pub const ITEM_COMMENTS: &str = r#"
query($id: ID!, $limit: Int!) {
  node(id: $id) {
    __typename
    ... on Issue {
      comments(last: $limit) {
        nodes { id body createdAt updatedAt url author { login url avatarUrl } }
      }
    }
    ... on PullRequest {
      comments(last: $limit) {
        nodes { id body createdAt updatedAt url author { login url avatarUrl } }
      }
    }
  }
}"#;

pub const UPDATE_ITEM_FIELD_VALUE: &str = r#"
mutation($input: UpdateProjectV2ItemFieldValueInput!) {
  updateProjectV2ItemFieldValue(input: $input) {
    projectV2Item { id }
  }
}"#;

pub const CLEAR_ITEM_FIELD_VALUE: &str = r#"
mutation($input: ClearProjectV2ItemFieldValueInput!) {
  clearProjectV2ItemFieldValue(input: $input) {
    projectV2Item { id }
  }
}"#;

pub const UPSERT_SINGLE_SELECT_OPTION: &str = r#"
mutation($input: UpdateProjectV2SingleSelectOptionInput!) {
  updateProjectV2SingleSelectOption(input: $input) {
    option: projectV2SingleSelectOption { id name color }
  }
}"#;

pub const DELETE_SINGLE_SELECT_OPTION: &str = r#"
mutation($input: DeleteProjectV2SingleSelectOptionInput!) {
  deleteProjectV2SingleSelectOption(input: $input) {
    deletedOptionId
  }
}"#;

pub const CREATE_ITERATION_FIELD: &str = r#"
mutation($input: CreateProjectV2FieldInput!) {
  createProjectV2Field(input: $input) {
    projectV2Field {
      ... on ProjectV2IterationField {
        id name dataType
        configuration { duration startDay }
      }
    }
  }
}"#;

pub const CREATE_SINGLE_SELECT_FIELD: &str = r#"
mutation($input: CreateProjectV2FieldInput!) {
  createProjectV2Field(input: $input) {
    projectV2Field {
      ... on ProjectV2SingleSelectField {
        id name dataType
        options { id name color }
      }
    }
  }
}"#;

pub const CREATE_NUMBER_FIELD: &str = r#"
mutation($input: CreateProjectV2FieldInput!) {
  createProjectV2Field(input: $input) {
    projectV2Field {
      ... on ProjectV2Field { id name dataType }
    }
  }
}"#;
