use std::future::Future;

use futures::future::LocalBoxFuture;
use mpc::{
    circuits::join_circuits_all, executor::MpcExecutionContext, join_circuits, MpcContext,
    MpcEngine,
};

use crate::{
    cell::check_input_value,
    operators::{
        self, check_gather_recipients, check_party, check_private_rows, check_recipients,
        KeyMode,
    },
    relation::check_column,
    sort_rows, Cell, Deferred, Fanout, Flag, NodeId, PlainRelation, RelError, Relation, Row,
    SortOrder,
};

/// Relation produced by a node of [`QuerySession`]. Its width is public and known upfront.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelationNode {
    id: NodeId,
    width: usize,
}

impl RelationNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

/// Handle of an output registered in [`QuerySession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputHandle(usize);

/// Relation that will be produced by another node.
pub type DeferredRelation<T> = Deferred<Relation<T>>;

type OutputFuture<'a> = LocalBoxFuture<'a, Result<Option<PlainRelation>, RelError>>;

/// Graph of relational operators evaluated within a single circuit.
///
/// Operators are registered first. Arguments that can be checked locally are validated on
/// registration, so misuse is reported before any communication. [`QuerySession::finish`] then
/// runs every node concurrently. Output of a node can feed any number of other nodes, and each
/// of them receives its own copy.
///
/// All parties must register the same operators in the same order.
pub struct QuerySession<'a, E: MpcEngine> {
    ctx: &'a MpcExecutionContext<E>,
    nodes: Vec<Fanout<'a, Relation<E::Share>>>,
    widths: Vec<usize>,
    outputs: Vec<OutputFuture<'a>>,
}

impl<'a, E: MpcEngine> QuerySession<'a, E> {
    pub fn new(ctx: &'a MpcExecutionContext<E>) -> Self {
        Self {
            ctx,
            nodes: Vec::new(),
            widths: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn context(&self) -> &'a MpcExecutionContext<E> {
        self.ctx
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn register(
        &mut self,
        width: usize,
        producer: impl Future<Output = Result<Relation<E::Share>, RelError>> + 'a,
    ) -> RelationNode {
        let id = NodeId(self.nodes.len());
        tracing::debug!(node = %id, width, "registered node");
        self.nodes.push(Fanout::new(id, producer));
        self.widths.push(width);
        RelationNode { id, width }
    }

    fn register_output(
        &mut self,
        output: impl Future<Output = Result<Option<PlainRelation>, RelError>> + 'a,
    ) -> OutputHandle {
        self.outputs.push(Box::pin(output));
        OutputHandle(self.outputs.len() - 1)
    }

    /// Subscribe to output of existing node.
    fn consume(&mut self, node: RelationNode) -> Result<DeferredRelation<E::Share>, RelError> {
        match (self.nodes.get_mut(node.id.0), self.widths.get(node.id.0)) {
            (Some(producer), Some(&width)) if width == node.width => Ok(producer.another()),
            _ => Err(RelError::UnknownNode(node.id)),
        }
    }

    fn check_node(&self, node: RelationNode) -> Result<(), RelError> {
        match self.widths.get(node.id.0) {
            Some(&width) if width == node.width => Ok(()),
            _ => Err(RelError::UnknownNode(node.id)),
        }
    }

    /// Secret-share private rows of every party. See [`operators::input`].
    pub fn input(&mut self, rows: PlainRelation, width: usize) -> Result<RelationNode, RelError> {
        check_private_rows(width, &rows)?;
        let ctx = self.ctx;
        Ok(self.register(width, operators::input(ctx, rows, width)))
    }

    /// Share private rows with per-column thresholds. See [`operators::scatter`].
    pub fn scatter(
        &mut self,
        rows: PlainRelation,
        thresholds: Vec<usize>,
    ) -> Result<RelationNode, RelError> {
        let width = thresholds.len();
        check_private_rows(width, &rows)?;
        let ctx = self.ctx;
        Ok(self.register(width, async move {
            operators::scatter(ctx, rows, &thresholds).await
        }))
    }

    /// Relation with a single public cell holding value known to `owner`.
    /// Other parties pass None.
    pub fn broadcast_constant(
        &mut self,
        owner: usize,
        value: Option<i64>,
    ) -> Result<RelationNode, RelError> {
        check_party(self.ctx, owner)?;
        if owner == self.ctx.party_id() {
            check_input_value(value.ok_or(RelError::MissingValue(owner))?)?;
        }
        let ctx = self.ctx;
        Ok(self.register(1, async move {
            let value = operators::broadcast_constant(ctx, owner, value).await?;
            Relation::from_plain(1, vec![vec![value]])
        }))
    }

    /// Public relation known to all parties.
    pub fn constant(
        &mut self,
        rows: PlainRelation,
        width: usize,
    ) -> Result<RelationNode, RelError> {
        let rel = Relation::from_plain(width, rows)?;
        Ok(self.register(width, async move { Ok(rel) }))
    }

    /// Reveal given columns to `recipients`, which must be all parties.
    /// See [`QuerySession::gather_to`] for revealing columns to some of them.
    pub fn gather(
        &mut self,
        node: RelationNode,
        columns: Vec<usize>,
        recipients: Vec<usize>,
    ) -> Result<RelationNode, RelError> {
        for &column in &columns {
            check_column(node.width, column)?;
        }
        check_gather_recipients(self.ctx, &recipients)?;
        let input = self.consume(node)?;
        let ctx = self.ctx;
        Ok(self.register(node.width, async move {
            operators::gather(ctx, input.await?, &columns, &recipients).await
        }))
    }

    /// Local row transformation producing rows of given width.
    pub fn project<F>(
        &mut self,
        node: RelationNode,
        width: usize,
        transform: F,
    ) -> Result<RelationNode, RelError>
    where
        F: Fn(&MpcExecutionContext<E>, &[Cell<E::Share>]) -> Row<E::Share> + 'a,
    {
        let input = self.consume(node)?;
        let ctx = self.ctx;
        Ok(self.register(width, async move {
            operators::project(ctx, input.await?, width, transform)
        }))
    }

    /// Interactive row transformation, e.g. division or product of secret cells.
    pub fn project_with<F, Fut>(
        &mut self,
        node: RelationNode,
        width: usize,
        transform: F,
    ) -> Result<RelationNode, RelError>
    where
        F: Fn(&'a MpcExecutionContext<E>, Row<E::Share>) -> Fut + 'a,
        Fut: Future<Output = Result<Row<E::Share>, RelError>> + 'a,
    {
        let input = self.consume(node)?;
        let ctx = self.ctx;
        Ok(self.register(width, async move {
            operators::project_with(ctx, input.await?, width, &transform).await
        }))
    }

    /// Keep rows satisfying predicate, revealing only the number of rejected rows.
    pub fn select<P, Fut>(
        &mut self,
        node: RelationNode,
        predicate: P,
    ) -> Result<RelationNode, RelError>
    where
        P: Fn(&'a MpcExecutionContext<E>, Row<E::Share>) -> Fut + 'a,
        Fut: Future<Output = Result<Flag<E::Share>, RelError>> + 'a,
    {
        let input = self.consume(node)?;
        let ctx = self.ctx;
        Ok(self.register(node.width, async move {
            operators::select(ctx, input.await?, &predicate).await
        }))
    }

    /// Oblivious sort by given column.
    pub fn sort(
        &mut self,
        node: RelationNode,
        key_col: usize,
        order: SortOrder,
    ) -> Result<RelationNode, RelError> {
        check_column(node.width, key_col)?;
        let input = self.consume(node)?;
        let ctx = self.ctx;
        Ok(self.register(node.width, async move {
            let rel = input.await?;
            let width = rel.width();
            let key = |row: &[Cell<E::Share>]| row[key_col];
            let rows = sort_rows(ctx, rel.into_rows(), &key, order).await;
            Relation::new(width, rows)
        }))
    }

    /// Equi-join. Result has the key column, then remaining columns of `left` and `right`.
    pub fn join(
        &mut self,
        left: RelationNode,
        right: RelationNode,
        left_col: usize,
        right_col: usize,
        mode: KeyMode,
    ) -> Result<RelationNode, RelError> {
        check_column(left.width, left_col)?;
        check_column(right.width, right_col)?;
        self.check_node(left)?;
        self.check_node(right)?;
        let (left_input, right_input) = (self.consume(left)?, self.consume(right)?);
        let ctx = self.ctx;
        Ok(self.register(left.width + right.width - 1, async move {
            let (left, right) = join_circuits!(left_input, right_input);
            operators::join(ctx, left?, right?, left_col, right_col, mode).await
        }))
    }

    /// Grouped sum producing (key, sum) rows.
    pub fn aggregate_sum(
        &mut self,
        node: RelationNode,
        key_col: usize,
        agg_col: usize,
        mode: KeyMode,
    ) -> Result<RelationNode, RelError> {
        check_column(node.width, key_col)?;
        check_column(node.width, agg_col)?;
        let input = self.consume(node)?;
        let ctx = self.ctx;
        Ok(self.register(2, async move {
            operators::aggregate_sum(ctx, input.await?, key_col, agg_col, mode).await
        }))
    }

    /// Reveal relation to all parties once the session finishes.
    pub fn output(&mut self, node: RelationNode) -> Result<OutputHandle, RelError> {
        let input = self.consume(node)?;
        let ctx = self.ctx;
        Ok(self.register_output(async move {
            Ok(Some(operators::output(ctx, input.await?).await))
        }))
    }

    /// Reveal relation only to given parties once the session finishes.
    pub fn output_to(
        &mut self,
        node: RelationNode,
        recipients: Vec<usize>,
    ) -> Result<OutputHandle, RelError> {
        check_recipients(self.ctx, &recipients)?;
        let input = self.consume(node)?;
        let ctx = self.ctx;
        Ok(self.register_output(async move {
            operators::output_to(ctx, input.await?, &recipients).await
        }))
    }

    /// Reveal given columns only to `recipients` once the session finishes.
    /// The revealed relation holds just those columns.
    pub fn gather_to(
        &mut self,
        node: RelationNode,
        columns: Vec<usize>,
        recipients: Vec<usize>,
    ) -> Result<OutputHandle, RelError> {
        for &column in &columns {
            check_column(node.width, column)?;
        }
        check_recipients(self.ctx, &recipients)?;
        let input = self.consume(node)?;
        let ctx = self.ctx;
        Ok(self.register_output(async move {
            operators::gather_to(ctx, input.await?, &columns, &recipients).await
        }))
    }

    /// Run all registered nodes and outputs to completion.
    /// Every node runs even if another one fails. The first error in registration order is
    /// returned, errors of nodes before errors of outputs.
    pub async fn finish(self) -> Result<QueryResults, RelError> {
        let QuerySession { nodes, outputs, .. } = self;
        tracing::debug!(nodes = nodes.len(), outputs = outputs.len(), "running query");

        let (forwarded, outputs) = join_circuits!(
            join_circuits_all(nodes.into_iter().map(Fanout::forward)),
            join_circuits_all(outputs)
        );
        forwarded.into_iter().collect::<Result<(), _>>()?;
        let outputs = outputs.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(QueryResults { outputs })
    }
}

/// Revealed outputs of finished session.
#[derive(Clone, Debug, Default)]
pub struct QueryResults {
    outputs: Vec<Option<PlainRelation>>,
}

impl QueryResults {
    /// Take revealed output. None if current party isn't a recipient or output was already taken.
    pub fn take(&mut self, handle: OutputHandle) -> Option<PlainRelation> {
        self.outputs.get_mut(handle.0).and_then(Option::take)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use mpc::circuits::testing::*;

    use super::*;
    use crate::{divide, test_util::*};

    fn sorted(mut rows: PlainRelation) -> PlainRelation {
        rows.sort();
        rows
    }

    #[tokio::test]
    async fn test_spdz_private_aggregate() {
        let results = run_spdz(2, |ctx| {
            Box::pin(async move {
                let rows = if ctx.party_id() == 0 {
                    vec![vec![1, 2], vec![1, 3], vec![2, 3]]
                } else {
                    Vec::new()
                };
                let mut session = QuerySession::new(ctx);
                let rel = session.input(rows, 2)?;
                let sums = session.aggregate_sum(rel, 0, 1, KeyMode::Private)?;
                let out = session.output(sums)?;
                Ok::<_, RelError>(session.finish().await?.take(out))
            })
        })
        .await;

        for result in results {
            let rows = result.unwrap().unwrap().unwrap();
            assert_eq!(sorted(rows), vec![vec![1, 5], vec![2, 3]]);
        }
    }

    #[tokio::test]
    async fn test_spdz_join_of_two_parties() {
        let results = run_spdz(2, |ctx| {
            Box::pin(async move {
                let id = ctx.party_id();
                let own = |rows: PlainRelation| if id == 0 { rows } else { Vec::new() };
                let theirs = |rows: PlainRelation| if id == 1 { rows } else { Vec::new() };

                let mut session = QuerySession::new(ctx);
                let left = session.input(own(vec![vec![1, 10], vec![2, 20]]), 2)?;
                let right = session.input(theirs(vec![vec![2, 7], vec![3, 8]]), 2)?;
                let joined = session.join(left, right, 0, 0, KeyMode::Private)?;
                assert_eq!(joined.width(), 3);
                let out = session.output_to(joined, vec![1])?;
                Ok::<_, RelError>(session.finish().await?.take(out))
            })
        })
        .await;

        let results: Vec<_> = results.into_iter().map(|r| r.unwrap().unwrap()).collect();
        assert_eq!(results, vec![None, Some(vec![vec![2, 20, 7]])]);
    }

    #[tokio::test]
    async fn test_fan_out_to_multiple_consumers() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let mut session = QuerySession::new(ctx);
                let rel = session.input(vec![vec![3, 1], vec![1, 2], vec![2, 3]], 2).unwrap();
                let scaled = session
                    .project(rel, 1, |_, row| vec![row[1].scale(10)])
                    .unwrap();
                let by_key = session.sort(rel, 0, SortOrder::Ascending).unwrap();
                let outputs = [
                    session.output(rel).unwrap(),
                    session.output(scaled).unwrap(),
                    session.output(by_key).unwrap(),
                ];
                assert_eq!(session.num_nodes(), 3);

                let mut results = session.finish().await.unwrap();
                assert_eq!(results.len(), 3);
                let [raw, scaled, by_key] = outputs.map(|handle| results.take(handle));
                assert_eq!(raw, Some(vec![vec![3, 1], vec![1, 2], vec![2, 3]]));
                assert_eq!(scaled, Some(vec![vec![10], vec![20], vec![30]]));
                assert_eq!(by_key, Some(vec![vec![1, 2], vec![2, 3], vec![3, 1]]));
                assert_eq!(results.take(outputs[0]), None);
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_node_without_consumers() {
        let (_, stats) = run_mock(|ctx| {
            Box::pin(async move {
                let mut session = QuerySession::new(ctx);
                session.input(vec![vec![1]], 1).unwrap();
                let results = session.finish().await.unwrap();
                assert!(results.is_empty());
            })
        })
        .await;
        assert_eq!(stats.num_inputs, 2);
    }

    #[tokio::test]
    async fn test_divide_and_select() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let mut session = QuerySession::new(ctx);
                let rel = session.input(vec![vec![50, 10], vec![9, 3], vec![7, 0]], 2).unwrap();
                let ratios = session
                    .project_with(rel, 1, |ctx, row| async move {
                        let ratio = divide(ctx, row[0], row[1], 4).await?;
                        Ok::<_, RelError>(vec![ratio])
                    })
                    .unwrap();
                let small = session
                    .select(ratios, |ctx, row| async move {
                        Ok(row[0].less_eq(ctx, Cell::Plain(5)).await)
                    })
                    .unwrap();
                let out = session.output(small).unwrap();

                let rows = session.finish().await.unwrap().take(out).unwrap();
                assert_eq!(sorted(rows), vec![vec![3], vec![5]]);
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_scatter_gather_open_aggregate() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let mut session = QuerySession::new(ctx);
                let rel = session
                    .scatter(vec![vec![2, 5], vec![1, 4], vec![2, 6]], vec![0, 1])
                    .unwrap();
                let sums = session.aggregate_sum(rel, 0, 1, KeyMode::Open).unwrap();
                let public = session.gather(sums, vec![1], vec![0]).unwrap();
                let out = session.output(public).unwrap();

                let rows = session.finish().await.unwrap().take(out);
                assert_eq!(rows, Some(vec![vec![1, 4], vec![2, 11]]));
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_spdz_gather_to_single_party() {
        let results = run_spdz(2, |ctx| {
            Box::pin(async move {
                let rows = if ctx.party_id() == 1 {
                    vec![vec![4, 40], vec![5, 50]]
                } else {
                    Vec::new()
                };
                let mut session = QuerySession::new(ctx);
                let rel = session.input(rows, 2)?;
                let out = session.gather_to(rel, vec![1], vec![0])?;
                Ok::<_, RelError>(session.finish().await?.take(out))
            })
        })
        .await;

        let results: Vec<_> = results.into_iter().map(|r| r.unwrap().unwrap()).collect();
        assert_eq!(results, vec![Some(vec![vec![40], vec![50]]), None]);
    }

    #[tokio::test]
    async fn test_spdz_broadcast_constant() {
        let results = run_spdz(3, |ctx| {
            Box::pin(async move {
                let value = (ctx.party_id() == 2).then(|| 77);
                let mut session = QuerySession::new(ctx);
                let constant = session.broadcast_constant(2, value)?;
                let out = session.output(constant)?;
                Ok::<_, RelError>(session.finish().await?.take(out))
            })
        })
        .await;

        for result in results {
            assert_eq!(result.unwrap(), Ok(Some(vec![vec![77]])));
        }
    }

    #[tokio::test]
    async fn test_error_is_propagated_to_consumers() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let mut session = QuerySession::new(ctx);
                let rel = session.input(vec![vec![1, 2]], 2).unwrap();
                let sums = session.aggregate_sum(rel, 0, 1, KeyMode::Open).unwrap();
                let doubled = session
                    .project(sums, 2, |_, row| vec![row[0], row[1].scale(2)])
                    .unwrap();
                session.output(doubled).unwrap();
                let healthy = session.output(rel).unwrap();
                assert_eq!(healthy, OutputHandle(1));

                let result = session.finish().await;
                assert_eq!(result.unwrap_err(), RelError::KeyNotPublic(0));
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_local_validation() {
        let (_, stats) = run_mock(|ctx| {
            Box::pin(async move {
                let mut session = QuerySession::new(ctx);
                let rel = session.input(vec![vec![1, 2]], 2).unwrap();

                assert_eq!(
                    session.input(vec![vec![1]], 2),
                    Err(RelError::WidthMismatch { expected: 2, found: 1 })
                );
                assert_eq!(
                    session.gather(rel, vec![2], vec![0]),
                    Err(RelError::ColumnOutOfRange { column: 2, width: 2 })
                );
                assert_eq!(
                    session.gather(rel, vec![1], Vec::new()),
                    Err(RelError::PartialGather { recipients: 0, parties: 1 })
                );
                assert_eq!(
                    session.gather_to(rel, vec![0], vec![2]),
                    Err(RelError::UnknownParty(2))
                );
                assert_eq!(
                    session.sort(rel, 5, SortOrder::Descending),
                    Err(RelError::ColumnOutOfRange { column: 5, width: 2 })
                );
                assert_eq!(session.output_to(rel, vec![1]), Err(RelError::UnknownParty(1)));
                assert_eq!(session.broadcast_constant(0, None), Err(RelError::MissingValue(0)));

                let foreign = RelationNode {
                    id: NodeId(9),
                    width: 2,
                };
                assert_eq!(session.output(foreign), Err(RelError::UnknownNode(NodeId(9))));
                assert_eq!(
                    session.join(rel, foreign, 0, 0, KeyMode::Private),
                    Err(RelError::UnknownNode(NodeId(9)))
                );
                assert_eq!(session.num_nodes(), 1);
                session.finish().await.unwrap();
            })
        })
        .await;
        assert_eq!(stats.num_rounds, 3);
    }
}
