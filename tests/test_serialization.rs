//! Round-trip serialization tests, enabled with the `serde` feature.

use anyhow::Result;
use hypertree::geometry::EuclideanDistance;
use hypertree::minmax_heap::MinMaxHeap;
use hypertree::quadtree::QuadTree;
use hypertree::rect_quadtree::RectQuadTree;
use hypertree::rstar_tree::RStarTree;

#[test]
fn test_quadtree_serialization() -> Result<()> {
    let mut tree: QuadTree<String> = QuadTree::new(2)?;
    tree.insert(&[10.0, 20.0], "point1".to_string())?;
    tree.insert(&[50.0, 50.0], "point2".to_string())?;

    let encoded: Vec<u8> = bincode::serialize(&tree)?;
    let decoded: QuadTree<String> = bincode::deserialize(&encoded[..])?;

    assert_eq!(decoded.len(), tree.len());
    let before: Vec<_> = tree
        .knn::<EuclideanDistance>(&[12.0, 22.0], 1)?
        .map(|e| e.value.clone())
        .collect();
    let after: Vec<_> = decoded
        .knn::<EuclideanDistance>(&[12.0, 22.0], 1)?
        .map(|e| e.value.clone())
        .collect();
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn test_rect_quadtree_serialization() -> Result<()> {
    let mut tree: RectQuadTree<String> = RectQuadTree::new(2)?;
    tree.insert(&[0.0, 0.0], &[10.0, 10.0], "box1".to_string())?;
    tree.insert(&[20.0, 20.0], &[30.0, 30.0], "box2".to_string())?;

    let encoded: Vec<u8> = bincode::serialize(&tree)?;
    let decoded: RectQuadTree<String> = bincode::deserialize(&encoded[..])?;

    assert_eq!(decoded.len(), tree.len());
    assert_eq!(
        decoded.query_exact(&[0.0, 0.0], &[10.0, 10.0]),
        tree.query_exact(&[0.0, 0.0], &[10.0, 10.0])
    );
    Ok(())
}

#[test]
fn test_rstar_tree_serialization() -> Result<()> {
    let mut tree: RStarTree<String> = RStarTree::new(3)?;
    for i in 0..20 {
        let c = i as f64;
        tree.insert(&[c, c, c], &[c + 1.0, c + 1.0, c + 1.0], format!("box{i}"))?;
    }

    let encoded: Vec<u8> = bincode::serialize(&tree)?;
    let decoded: RStarTree<String> = bincode::deserialize(&encoded[..])?;

    assert_eq!(decoded.len(), tree.len());
    assert!(decoded.check_invariants());
    let before = tree.window(&[5.0, 5.0, 5.0], &[9.0, 9.0, 9.0])?.count();
    let after = decoded.window(&[5.0, 5.0, 5.0], &[9.0, 9.0, 9.0])?.count();
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn test_minmax_heap_serialization() -> Result<()> {
    let mut heap: MinMaxHeap<i64> = (0..100).collect();
    let encoded: Vec<u8> = bincode::serialize(&heap)?;
    let mut decoded: MinMaxHeap<i64> = bincode::deserialize(&encoded[..])?;

    assert!(decoded.check_consistency());
    assert_eq!(decoded.pop_min(), heap.pop_min());
    assert_eq!(decoded.pop_max(), heap.pop_max());
    Ok(())
}
