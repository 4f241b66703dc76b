mod common;

use common::{customer, open_uow, Customer};
use datakeep_core::{Pagination, Repository, SqliteUnitOfWork, StoreError, UnitOfWork};

fn seeded(count: i64) -> SqliteUnitOfWork {
    let uow = open_uow();
    let customers: Vec<Customer> = (1..=count)
        .map(|id| customer(id, &format!("customer-{id:02}")))
        .collect();
    uow.repository::<Customer>().insert_many(customers).unwrap();
    uow.save().unwrap();
    uow
}

fn stored_ids(uow: &SqliteUnitOfWork) -> Vec<i64> {
    uow.repository::<Customer>()
        .get_all("", true)
        .unwrap()
        .to_vec()
        .unwrap()
        .iter()
        .map(|customer| customer.id)
        .collect()
}

#[test]
fn first_page_holds_page_length_items_and_full_total() {
    let uow = seeded(25);
    let page = uow
        .repository::<Customer>()
        .paginate(Pagination::new(1, 10))
        .unwrap();

    assert_eq!(page.total_items, 25);
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.items.first().map(|c| c.id), Some(1));
    assert_eq!(page.total_pages(), 3);
    assert!(page.has_next_page());
}

#[test]
fn last_partial_page_and_pages_past_the_end() {
    let uow = seeded(25);
    let customers = uow.repository::<Customer>();

    let last = customers.paginate(Pagination::new(3, 10)).unwrap();
    let ids: Vec<i64> = last.items.iter().map(|c| c.id).collect();
    assert_eq!(ids, (21..=25).collect::<Vec<_>>());
    assert!(!last.has_next_page());

    let beyond = customers.paginate(Pagination::new(4, 10)).unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total_items, 25);
}

#[test]
fn short_collections_fit_on_one_page() {
    let uow = seeded(4);
    let page = uow
        .repository::<Customer>()
        .paginate(Pagination::new(1, 10))
        .unwrap();
    assert_eq!(page.total_items, 4);
    assert_eq!(page.items.len(), 4);
    assert_eq!(page.total_pages(), 1);
}

#[test]
fn pages_are_disjoint_and_follow_key_order() {
    let uow = seeded(12);
    let customers = uow.repository::<Customer>();

    let mut collected = Vec::new();
    for page in 1..=3 {
        let result = customers.paginate(Pagination::new(page, 5)).unwrap();
        collected.extend(result.items.into_iter().map(|c| c.id));
    }
    assert_eq!(collected, stored_ids(&uow));
    assert_eq!(collected, (1..=12).collect::<Vec<_>>());
}

#[test]
fn zero_page_or_zero_length_is_rejected() {
    let uow = seeded(3);
    let customers = uow.repository::<Customer>();

    assert!(matches!(
        customers.paginate(Pagination::new(0, 10)),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        customers.paginate(Pagination::new(1, 0)),
        Err(StoreError::InvalidArgument(_))
    ));
}

#[test]
fn pagination_does_not_track_results() {
    let conn = common::migrated_connection();
    conn.execute_batch("INSERT INTO customers (id, name) VALUES (1, 'Ada'), (2, 'Grace');")
        .unwrap();
    let uow = SqliteUnitOfWork::new(conn);

    let page = uow
        .repository::<Customer>()
        .paginate(Pagination::new(1, 10))
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(uow.session().entries().is_empty());
}
