//! GraphQL documents sent to the Admin API

pub const PRODUCTS_QUERY: &str = r#"
query Products($first: Int!, $after: String) {
  products(first: $first, after: $after, sortKey: UPDATED_AT) {
    edges {
      cursor
      node {
        id
        title
        productType
        vendor
        tags
        totalInventory
        createdAt
      }
    }
    pageInfo {
      hasNextPage
      endCursor
    }
  }
}
"#;

pub const ORDERS_QUERY: &str = r#"
query Orders($first: Int!, $after: String, $query: String) {
  orders(first: $first, after: $after, query: $query, sortKey: CREATED_AT) {
    edges {
      cursor
      node {
        id
        createdAt
        lineItems(first: 100) {
          edges {
            node {
              quantity
              product {
                id
              }
            }
          }
        }
      }
    }
    pageInfo {
      hasNextPage
      endCursor
    }
  }
}
"#;

pub const TAGS_ADD_MUTATION: &str = r#"
mutation TagsAdd($id: ID!, $tags: [String!]!) {
  tagsAdd(id: $id, tags: $tags) {
    node {
      id
    }
    userErrors {
      field
      message
    }
  }
}
"#;
